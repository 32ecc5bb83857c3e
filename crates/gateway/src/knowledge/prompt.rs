//! Knowledge-chat prompt templates
//!
//! Placeholders: `{context}`, `{question}`, plus `{relations}`,
//! `{graph_context}` and `{document_context}` for space-level templates that
//! want the sources separately.

use hybridqa_common::llm::ChatMessage;
use hybridqa_search::FusedContext;
use regex_lite::{Captures, Regex};
use std::sync::OnceLock;

pub const NO_EVIDENCE_ANSWER_ZH: &str = "根据当前资料，无法提供这方面的具体信息。";
pub const NO_EVIDENCE_ANSWER_EN: &str =
    "Based on current materials, I cannot provide specific information on this topic.";

const TEMPLATE_ZH: &str = r#"你是一个权威的问答专家，请基于提供的信息直接回答用户的问题。

回答要求:
1. 只能基于提供的已知内容回答，不能引用或编造其他资料来源
2. 回答要自然流畅，直接给出答案，不要提及信息来源
3. 如果提供的信息存在冲突，采用更准确的信息
4. 如果信息互补，自然地整合所有相关内容
5. 严格禁止编造内容，包括编造资料来源

无信息处理:
如果提供的内容无法回答用户问题，请直接回答: "根据当前资料，无法提供这方面的具体信息。"

格式要求:
1. 如果已知信息包含图片、链接、表格、代码块等特殊markdown标签格式的信息，确保在答案中包含原文这些标签，不要丢弃不要修改。
2. 回答时可以适当分点说明，使用markdown格式让内容更清晰。
3. 禁止编造任何内容，禁止引用"公开资料"、"历史文献"等不存在的来源。

已知内容:
{context}

问题:
{question}
"#;

const TEMPLATE_EN: &str = r#"You are an authoritative Q&A expert. Please answer user questions directly based on the provided information.

Answer Requirements:
1. Only answer based on the provided known content, do not cite or fabricate other sources
2. Answer naturally and fluently, give direct answers without mentioning information sources
3. If provided information conflicts, use more accurate information
4. If information is complementary, naturally integrate all relevant content
5. Strictly prohibited from fabricating content, including fabricating data sources

No Information Handling:
If the provided content cannot answer the user's question, please directly answer: "Based on current materials, I cannot provide specific information on this topic."

Format Requirements:
1. Ensure to include original markdown formatting elements such as images, links, tables, or code blocks without alteration in the response if they are present in the provided information.
2. When responding, you may appropriately organize points and use markdown format to make content clearer.
3. Prohibited from fabricating any content, prohibited from citing "public materials", "historical documents" or other non-existent sources.

known information:
{context}

question:
{question}
"#;

/// Built-in template for a language; anything but `en` is Chinese
pub fn default_template(language: &str) -> &'static str {
    if language == "en" {
        TEMPLATE_EN
    } else {
        TEMPLATE_ZH
    }
}

/// Fixed answer when neither source produced evidence
pub fn no_evidence_answer(language: &str) -> &'static str {
    if language == "en" {
        NO_EVIDENCE_ANSWER_EN
    } else {
        NO_EVIDENCE_ANSWER_ZH
    }
}

/// System prompt carrying the context, then the question as the user turn
pub fn build_messages(template: &str, fused: &FusedContext, question: &str) -> Vec<ChatMessage> {
    let relations = fused.relations.join(", ");
    // Single pass: placeholders inside substituted text stay literal
    let system = placeholder_pattern().replace_all(template, |caps: &Captures| match &caps[1] {
        "context" => fused.context.as_str(),
        "graph_context" => fused.graph_context.as_str(),
        "document_context" => fused.document_context.as_str(),
        "relations" => relations.as_str(),
        _ => question,
    });

    vec![ChatMessage::system(system.into_owned()), ChatMessage::user(question)]
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{(context|graph_context|document_context|relations|question)\}")
            .expect("placeholder pattern is valid")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hybridqa_search::ContextFusion;

    #[test]
    fn test_default_template_fills_context() {
        let fused = ContextFusion::new().fuse("毛泽东，出生地为湘潭。", "");
        let messages = build_messages(default_template("zh"), &fused, "毛泽东的出生地");

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.contains("已知内容:\n毛泽东，出生地为湘潭。"));
        assert!(messages[0].content.contains("问题:\n毛泽东的出生地"));
        assert_eq!(messages[1], ChatMessage::user("毛泽东的出生地"));
    }

    #[test]
    fn test_custom_template_placeholders() {
        let fused = ContextFusion::new().fuse("G", "D");
        let messages = build_messages("[{document_context}|{graph_context}] {question}", &fused, "Q");
        assert_eq!(messages[0].content, "[D|G] Q");
    }

    #[test]
    fn test_retrieved_text_is_not_expanded() {
        let fused = ContextFusion::new().fuse("模板写法 {question} 与 {graph_context}", "");
        let messages = build_messages("{context}|{question}", &fused, "Q");
        assert_eq!(messages[0].content, "模板写法 {question} 与 {graph_context}|Q");
    }

    #[test]
    fn test_language_selection() {
        assert!(default_template("en").starts_with("You are an authoritative"));
        assert!(default_template("zh").starts_with("你是一个权威"));
        assert_eq!(no_evidence_answer("en"), NO_EVIDENCE_ANSWER_EN);
        assert_eq!(no_evidence_answer("fr"), NO_EVIDENCE_ANSWER_ZH);
    }
}
