//! Keyword rules mapping questions to Cypher
//!
//! Rules are evaluated in table order against the lower-cased question and
//! the first hit wins, so named entities sit above the broad categories
//! they belong to. User text never reaches the statement body: names and
//! question fragments are bound as parameters.

use serde_json::{Map, Value};

/// Characters of the question kept for the fallback property scan
pub const FALLBACK_FRAGMENT_CHARS: usize = 10;

/// A generated query, ready for parameterized execution
#[derive(Debug, Clone, PartialEq)]
pub struct GraphQuery {
    pub statement: String,
    pub parameters: Map<String, Value>,
    /// Result cardinality the statement was built with
    pub limit: usize,
    /// Name of the rule that produced the query; `None` for the fallback scan
    pub rule: Option<&'static str>,
}

impl GraphQuery {
    pub fn is_fallback(&self) -> bool {
        self.rule.is_none()
    }
}

/// What a matching rule queries for
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuleTarget {
    /// A specific person, matched on canonical or localized name
    Person { name: &'static str },
    /// Every node carrying a label
    Label { label: &'static str },
    /// Nodes of a label where a property is set
    LabelWithProperty {
        label: &'static str,
        property: &'static str,
    },
}

/// One row of the rule table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphRule {
    pub name: &'static str,
    pub keywords: &'static [&'static str],
    pub target: RuleTarget,
}

impl GraphRule {
    fn matches(&self, question_lower: &str) -> bool {
        self.keywords.iter().any(|k| question_lower.contains(k))
    }

    fn build(&self, limit: usize) -> (String, Map<String, Value>) {
        let mut parameters = Map::new();
        let statement = match self.target {
            RuleTarget::Person { name } => {
                parameters.insert("name".to_string(), Value::String(name.to_string()));
                format!(
                    "MATCH (n:{}) WHERE n.nodeName CONTAINS $name OR n.`人物名称` CONTAINS $name RETURN n LIMIT {}",
                    quote_identifier(super::PERSON_LABEL),
                    limit
                )
            }
            RuleTarget::Label { label } => {
                format!("MATCH (n:{}) RETURN n LIMIT {}", quote_identifier(label), limit)
            }
            RuleTarget::LabelWithProperty { label, property } => format!(
                "MATCH (n:{}) WHERE n.{} IS NOT NULL RETURN n LIMIT {}",
                quote_identifier(label),
                quote_identifier(property),
                limit
            ),
        };
        (statement, parameters)
    }
}

/// Domain rule table, most specific first
pub const DEFAULT_RULES: &[GraphRule] = &[
    GraphRule {
        name: "person:毛泽东",
        keywords: &["毛主席", "毛泽东"],
        target: RuleTarget::Person { name: "毛泽东" },
    },
    GraphRule {
        name: "person:曾国藩",
        keywords: &["曾国藩"],
        target: RuleTarget::Person { name: "曾国藩" },
    },
    GraphRule {
        name: "person:孙中山",
        keywords: &["孙中山"],
        target: RuleTarget::Person { name: "孙中山" },
    },
    GraphRule {
        name: "category:人物",
        keywords: &["历史人物", "人物"],
        target: RuleTarget::Label { label: "人物" },
    },
    GraphRule {
        name: "category:地点",
        keywords: &["地点", "地方", "城市"],
        target: RuleTarget::Label { label: "地点" },
    },
    GraphRule {
        name: "property:出生地",
        keywords: &["出生地"],
        target: RuleTarget::LabelWithProperty { label: "人物", property: "出生地" },
    },
    GraphRule {
        name: "category:事件",
        keywords: &["事件", "历史事件"],
        target: RuleTarget::Label { label: "事件" },
    },
    GraphRule {
        name: "category:战役阶段",
        keywords: &["战役", "军事行动", "战争"],
        target: RuleTarget::Label { label: "战役阶段" },
    },
    GraphRule {
        name: "category:组织",
        keywords: &["组织", "部队"],
        target: RuleTarget::Label { label: "组织" },
    },
    GraphRule {
        name: "category:国家",
        keywords: &["国家"],
        target: RuleTarget::Label { label: "国家" },
    },
    GraphRule {
        name: "category:政策",
        keywords: &["政策", "政权"],
        target: RuleTarget::Label { label: "政策" },
    },
    GraphRule {
        name: "category:文献",
        keywords: &["文献", "古籍"],
        target: RuleTarget::Label { label: "文献" },
    },
    GraphRule {
        name: "category:朝代",
        keywords: &["朝代", "王朝"],
        target: RuleTarget::Label { label: "朝代" },
    },
    GraphRule {
        name: "category:一带一路项目",
        keywords: &["一带一路", "项目"],
        target: RuleTarget::Label { label: "一带一路项目" },
    },
    GraphRule {
        name: "category:非物质文化遗产项目",
        keywords: &["非遗", "文化遗产", "传承"],
        target: RuleTarget::Label { label: "非物质文化遗产项目" },
    },
];

/// Maps questions to graph queries with an ordered rule table
#[derive(Debug, Clone)]
pub struct GraphQueryMapper {
    rules: Vec<GraphRule>,
}

impl Default for GraphQueryMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphQueryMapper {
    /// Mapper over the built-in domain rules
    pub fn new() -> Self {
        Self::with_rules(DEFAULT_RULES.to_vec())
    }

    /// Mapper over a custom table; order is priority
    pub fn with_rules(rules: Vec<GraphRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[GraphRule] {
        &self.rules
    }

    /// Build the query for a question
    pub fn map(&self, question: &str, limit: usize) -> GraphQuery {
        let question_lower = question.to_lowercase();

        if let Some(rule) = self.rules.iter().find(|r| r.matches(&question_lower)) {
            let (statement, parameters) = rule.build(limit);
            return GraphQuery {
                statement,
                parameters,
                limit,
                rule: Some(rule.name),
            };
        }

        let fragment: String = question.chars().take(FALLBACK_FRAGMENT_CHARS).collect();
        let mut parameters = Map::new();
        parameters.insert("fragment".to_string(), Value::String(fragment));

        GraphQuery {
            statement: format!(
                "MATCH (n) WHERE ANY(prop IN keys(n) WHERE toString(n[prop]) CONTAINS $fragment) RETURN n LIMIT {}",
                limit
            ),
            parameters,
            limit,
            rule: None,
        }
    }
}

/// Backtick-quote a label or property name
fn quote_identifier(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "``"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_truncates_question() {
        let mapper = GraphQueryMapper::new();
        let query = mapper.map("请介绍一下湖南省的风土人情和饮食习惯", 7);

        assert!(query.is_fallback());
        assert_eq!(query.limit, 7);
        assert!(query.statement.contains("CONTAINS $fragment"));
        assert!(query.statement.ends_with("LIMIT 7"));
        assert_eq!(query.parameters["fragment"], Value::String("请介绍一下湖南省的风".to_string()));
    }

    #[test]
    fn test_fallback_short_question_kept_whole() {
        let query = GraphQueryMapper::new().map("Hunan", 5);
        assert_eq!(query.parameters["fragment"], "Hunan");
    }

    #[test]
    fn test_question_text_is_never_interpolated() {
        let hostile = "x') DETACH DELETE n //";
        let query = GraphQueryMapper::new().map(hostile, 5);

        assert!(!query.statement.contains("DETACH"));
        assert!(!query.statement.contains('\''));
        assert_eq!(query.parameters["fragment"], "x') DETACH");
    }

    #[test]
    fn test_named_person_beats_category() {
        let mapper = GraphQueryMapper::new();
        let query = mapper.map("毛泽东是哪个地方的历史人物", 5);

        assert_eq!(query.rule, Some("person:毛泽东"));
        assert_eq!(query.parameters["name"], "毛泽东");
        assert!(query.statement.starts_with("MATCH (n:`人物`) WHERE n.nodeName CONTAINS $name"));
    }

    #[test]
    fn test_alias_maps_to_canonical_name() {
        let query = GraphQueryMapper::new().map("毛主席的主要成就", 3);
        assert_eq!(query.rule, Some("person:毛泽东"));
        assert_eq!(query.parameters["name"], "毛泽东");
    }

    #[test]
    fn test_category_rules() {
        let mapper = GraphQueryMapper::new();

        let query = mapper.map("有哪些重要的战役", 5);
        assert_eq!(query.statement, "MATCH (n:`战役阶段`) RETURN n LIMIT 5");

        let query = mapper.map("列出古籍", 2);
        assert_eq!(query.statement, "MATCH (n:`文献`) RETURN n LIMIT 2");
        assert!(query.parameters.is_empty());
    }

    #[test]
    fn test_birthplace_rule() {
        let query = GraphQueryMapper::new().map("出生地在哪里", 4);
        assert_eq!(query.rule, Some("property:出生地"));
        assert_eq!(
            query.statement,
            "MATCH (n:`人物`) WHERE n.`出生地` IS NOT NULL RETURN n LIMIT 4"
        );
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let rules = vec![GraphRule {
            name: "category:Place",
            keywords: &["city"],
            target: RuleTarget::Label { label: "Place" },
        }];
        let query = GraphQueryMapper::with_rules(rules).map("Which CITY?", 1);
        assert_eq!(query.rule, Some("category:Place"));
    }

    #[test]
    fn test_identifier_quoting() {
        assert_eq!(quote_identifier("人物"), "`人物`");
        assert_eq!(quote_identifier("a`b"), "`a``b`");
    }
}
