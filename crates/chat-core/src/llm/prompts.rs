use crate::language::ChatLanguage;

const ASSISTANT_PERSONA: &str = "You are a helpful assistant for a pharmacy website called PharmaCare. \
You help users with medicine information, order tracking, and health advice. \
Keep responses concise and helpful.";

const REPLY_FORMAT_RULES: &str = "RESPONSE RULES:\n\
- Do not ask the user any questions in the body of your reply.\n\
- End every reply with exactly three numbered follow-up questions the user could ask you next, \
each on its own line and ending with a question mark, formatted exactly as:\n\
1. <question>?\n\
2. <question>?\n\
3. <question>?";

const MAX_FOLLOW_UPS: usize = 3;

pub fn system_prompt(context: &str, language: ChatLanguage) -> String {
    let mut prompt = String::from(ASSISTANT_PERSONA);

    let context = context.trim();
    if !context.is_empty() {
        prompt.push_str("\n\nCURRENT USER CONTEXT:\n");
        prompt.push_str(context);
        prompt.push_str(
            "\nUse this information to answer user questions about their orders, cart, or account.",
        );
    }

    prompt.push_str("\n\n");
    prompt.push_str(language_instruction(language));
    prompt.push_str("\n\n");
    prompt.push_str(REPLY_FORMAT_RULES);
    prompt
}

fn language_instruction(language: ChatLanguage) -> &'static str {
    match language {
        ChatLanguage::English => "IMPORTANT: Reply in English only.",
        ChatLanguage::Hindi => "IMPORTANT: Reply in Hindi only, written in Devanagari script.",
        ChatLanguage::Hinglish => {
            "IMPORTANT: Reply in Hinglish only (Hindi written in English script). \
             Mix English and Hindi keywords naturally."
        }
    }
}

/// Appended to the final user turn so the language rule survives long histories.
pub fn language_reminder(language: ChatLanguage) -> &'static str {
    match language {
        ChatLanguage::English => {
            "(Reply strictly in English and finish with three numbered follow-up questions.)"
        }
        ChatLanguage::Hindi => {
            "(Reply strictly in Hindi using Devanagari script and finish with three numbered follow-up questions.)"
        }
        ChatLanguage::Hinglish => {
            "(Reply strictly in Hinglish using English script and finish with three numbered follow-up questions.)"
        }
    }
}

/// Returns the trailing block of `N. question?` lines, without their numbers.
pub fn extract_follow_up_questions(reply: &str) -> Vec<String> {
    let mut questions = reply
        .lines()
        .map(str::trim)
        .rev()
        .skip_while(|line| line.is_empty())
        .map_while(parse_follow_up_line)
        .take(MAX_FOLLOW_UPS)
        .collect::<Vec<_>>();
    questions.reverse();
    questions
}

fn parse_follow_up_line(line: &str) -> Option<String> {
    let mut chars = line.chars();
    let digit = chars.next()?;
    if !digit.is_ascii_digit() {
        return None;
    }

    let question = chars.as_str().strip_prefix(". ")?.trim();
    if question.is_empty() || !question.ends_with('?') {
        return None;
    }

    Some(question.to_string())
}
