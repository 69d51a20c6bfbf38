/// Placeholder in a prompt template that receives the dialogue payload.
pub const PAYLOAD_PLACEHOLDER: &str = "{{TRANSACTION}}";

/// User turn sent alongside the compiled system prompt.
///
/// "Analyse according to the information in the system prompt and output in
/// the required format."
pub const USER_INSTRUCTION: &str = "请根据系统提示中的信息进行分析并按要求格式输出。";

/// Substitute the payload into the template.
///
/// Every occurrence of [`PAYLOAD_PLACEHOLDER`] is replaced. A template without
/// the placeholder is returned verbatim.
pub fn compile_prompt(template: &str, payload: &str) -> String {
    template.replace(PAYLOAD_PLACEHOLDER, payload)
}

/// Join the compiled prompt and the user instruction for backends that take
/// a single prompt string.
pub fn single_turn_prompt(compiled: &str) -> String {
    format!("{compiled}\n\n{USER_INSTRUCTION}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_replaces_placeholder() {
        let prompt = compile_prompt("Dialogue:\n{{TRANSACTION}}\nAnswer.", "[{\"turn\":1}]");
        assert_eq!(prompt, "Dialogue:\n[{\"turn\":1}]\nAnswer.");
    }

    #[test]
    fn template_without_placeholder_is_verbatim() {
        let template = "Static system prompt";
        assert_eq!(compile_prompt(template, "ignored"), template);
    }

    #[test]
    fn payload_is_not_reinterpreted() {
        // A payload that itself contains the placeholder is inserted as-is.
        let prompt = compile_prompt("<{{TRANSACTION}}>", "{{TRANSACTION}}");
        assert_eq!(prompt, "<{{TRANSACTION}}>");
    }

    #[test]
    fn single_turn_prompt_appends_instruction() {
        let prompt = single_turn_prompt("SYSTEM");
        assert!(prompt.starts_with("SYSTEM\n\n"));
        assert!(prompt.ends_with(USER_INSTRUCTION));
    }
}
