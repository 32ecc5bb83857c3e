//! Query rewriting with the chat model

use super::QueryRewriter;
use async_trait::async_trait;
use hybridqa_common::errors::Result;
use hybridqa_common::llm::{ChatClient, ChatMessage};
use regex_lite::Regex;
use std::sync::{Arc, OnceLock};
use tracing::debug;

const PROMPT_ZH: &str = "请根据原问题生成{count}个相关的搜索问题，这些问题应与原问题相似，\
并且是人们可能会提出的、可以回答的搜索问题。不要使用示例中的内容，仅基于提供的原问题。\
每行输出一个问题，不要输出其他内容。\n原问题：{question}";

const PROMPT_EN: &str = "Generate {count} search queries related to the original question. \
They should be similar to the original question and answerable. Do not reuse any example \
content; base them only on the original question. Output one query per line and nothing else.\n\
Original question: {question}";

/// Leading list markers such as `1.`, `2)`, `-`, `•` or `（3）`
fn numbering() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:[-*•]\s*|[(（]\d+[)）]\s*|\d+[.)）、:：]\s*)").expect("numbering pattern is valid")
    })
}

/// Rewrites questions into alternative search queries via the chat model
pub struct LlmQueryRewriter {
    client: Arc<ChatClient>,
    language: String,
    count: usize,
}

impl LlmQueryRewriter {
    pub fn new(client: Arc<ChatClient>, language: impl Into<String>, count: usize) -> Self {
        Self {
            client,
            language: language.into(),
            count,
        }
    }

    fn prompt(&self, question: &str) -> String {
        let template = if self.language == "en" { PROMPT_EN } else { PROMPT_ZH };
        template
            .replace("{count}", &self.count.to_string())
            .replace("{question}", question)
    }
}

#[async_trait]
impl QueryRewriter for LlmQueryRewriter {
    async fn rewrite(&self, question: &str) -> Result<Vec<String>> {
        if self.count == 0 {
            return Ok(vec![]);
        }

        let reply = self
            .client
            .complete(&[ChatMessage::user(self.prompt(question))])
            .await?;

        let queries = parse_queries(&reply, self.count);
        debug!(queries = ?queries, "Rewritten queries");
        Ok(queries)
    }
}

/// One query per line; a single line is split on commas instead
fn parse_queries(reply: &str, count: usize) -> Vec<String> {
    let lines: Vec<&str> = reply.lines().filter(|l| !l.trim().is_empty()).collect();

    let parts: Vec<&str> = if lines.len() == 1 {
        lines[0].split([',', '，']).collect()
    } else {
        lines
    };

    parts
        .into_iter()
        .map(|part| {
            numbering()
                .replace(part, "")
                .trim()
                .trim_matches(|c| c == '\'' || c == '"')
                .trim()
                .to_string()
        })
        .filter(|q| !q.is_empty())
        .take(count)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hybridqa_common::config::LlmConfig;

    #[test]
    fn test_parse_numbered_lines() {
        let reply = "1. 毛泽东出生在哪里\n2) 毛泽东的故乡\n\n- 韶山冲在哪个省";
        assert_eq!(
            parse_queries(reply, 5),
            vec!["毛泽东出生在哪里", "毛泽东的故乡", "韶山冲在哪个省"]
        );
    }

    #[test]
    fn test_parse_comma_separated_line() {
        let reply = "'birthplace of Mao, Shaoshan village， Hunan province'";
        assert_eq!(
            parse_queries(reply, 2),
            vec!["birthplace of Mao", "Shaoshan village"]
        );
    }

    #[test]
    fn test_prompt_language() {
        let client = Arc::new(ChatClient::new(LlmConfig::default()).unwrap());

        let zh = LlmQueryRewriter::new(client.clone(), "zh", 3).prompt("湘潭");
        assert!(zh.contains("生成3个"));
        assert!(zh.ends_with("原问题：湘潭"));

        let en = LlmQueryRewriter::new(client, "en", 2).prompt("Hunan");
        assert!(en.starts_with("Generate 2 search queries"));
    }

    #[tokio::test]
    async fn test_zero_count_skips_model() {
        let client = Arc::new(ChatClient::new(LlmConfig::default()).unwrap());
        let rewriter = LlmQueryRewriter::new(client, "zh", 0);
        assert!(rewriter.rewrite("湘潭").await.unwrap().is_empty());
    }
}
