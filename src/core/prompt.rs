//! Prompt templates for the generative collaborator.
//!
//! Templates use `{{key}}` placeholders. Every placeholder is a required key
//! and rendering fails before any call is made when one is missing.

use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Template {template} is missing key(s): {keys:?}")]
    MissingKey {
        template: &'static str,
        keys: Vec<String>,
    },
}

/// A named prompt body with an explicit set of required substitution keys
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    pub name: &'static str,
    pub body: &'static str,
    pub required: &'static [&'static str],
}

impl PromptTemplate {
    /// Substitute every `{{key}}` from `values`. Extra values are ignored.
    pub fn render(&self, values: &HashMap<&str, String>) -> Result<String, TemplateError> {
        let missing: Vec<String> = self
            .required
            .iter()
            .filter(|key| !values.contains_key(*key))
            .map(|key| key.to_string())
            .collect();

        if !missing.is_empty() {
            return Err(TemplateError::MissingKey {
                template: self.name,
                keys: missing,
            });
        }

        // One pass over the body: substituted text is never rescanned
        let mut rendered = String::with_capacity(self.body.len());
        let mut rest = self.body;
        while let Some(start) = rest.find("{{") {
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                break;
            };
            rendered.push_str(&rest[..start]);

            let key = after[..end].trim();
            match values.get(key).filter(|_| self.required.contains(&key)) {
                Some(value) => rendered.push_str(value),
                None => rendered.push_str(&rest[start..start + 2 + end + 2]),
            }
            rest = &after[end + 2..];
        }
        rendered.push_str(rest);
        Ok(rendered)
    }
}

/// Keys referenced by `{{...}}` placeholders in a template body
pub fn placeholders(body: &str) -> BTreeSet<&str> {
    let mut keys = BTreeSet::new();
    let mut rest = body;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                keys.insert(after[..end].trim());
                rest = &after[end + 2..];
            }
            None => break,
        }
    }
    keys
}

pub const IDEAL_MATCH: PromptTemplate = PromptTemplate {
    name: "ideal_match",
    required: &["user_profile", "recent_messages"],
    body: r#"IDEAL MATCH DESCRIPTION TASK

User Profile Data:
{{user_profile}}

Recent Conversation:
{{recent_messages}}

Task:
Describe, in natural language, the person who would be the best professional
connection for this user. Write it as if it were that person's own profile:
their background, knowledge domain, the kind of project they work on and what
they are looking for. Be specific and keyword-dense; the text is only used to
search for similar profiles.

Rules:
1. Prose only, no lists or structured fields
2. Never mention the user's name or username
3. At most 120 words

Return an array containing a single object with the following structure:
[{
  "ideal_match_description": "A growth marketer with five years in consumer fitness apps ..."
}]

Do not include any additional text or explanation outside of the array structure.
"#,
};

pub const MATCH_INTRODUCTION: PromptTemplate = PromptTemplate {
    name: "match_introduction",
    required: &["user_profile", "candidates", "username", "platform"],
    body: r#"MATCHMAKING SOCIAL POST GENERATION TASK

User ({{platform}} @{{username}}) Profile Data:
{{user_profile}}

Potential Match Data (ranked by similarity):
{{candidates}}

Task:
From the above data, choose the single best match that aligns with the user's interests.
Generate a friendly social media post that introduces the user and the best match together.
The post should:
1. Use the proper @username for both the user (@{{username}}) and the chosen match
2. Highlight their synergy and how they might help solve each other's challenges
3. Do not use hashtags

Return an array containing a single object with the following structure:
[{
  "post": "Meet @someone! ...",
  "matchUsername": "the chosen candidate's username",
  "matchPlatform": "the chosen candidate's platform"
}]

Do not include any additional text or explanation outside of the array structure.
"#,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_keys_match_placeholders() {
        for template in [IDEAL_MATCH, MATCH_INTRODUCTION] {
            let declared: BTreeSet<&str> = template.required.iter().copied().collect();
            assert_eq!(placeholders(template.body), declared, "{}", template.name);
        }
    }

    #[test]
    fn test_render_substitutes_all_occurrences() {
        let mut values = HashMap::new();
        values.insert("user_profile", "{}".to_string());
        values.insert("candidates", "[]".to_string());
        values.insert("username", "alice".to_string());
        values.insert("platform", "telegram".to_string());

        let rendered = MATCH_INTRODUCTION.render(&values).unwrap();
        assert!(rendered.contains("telegram @alice"));
        assert!(rendered.contains("(@alice)"));
        assert!(placeholders(&rendered).is_empty());
    }

    #[test]
    fn test_render_leaves_placeholders_in_values_alone() {
        let mut values = HashMap::new();
        values.insert("user_profile", r#"{"summary": "I type {{candidates}} and {{username}}"}"#.to_string());
        values.insert("candidates", "[CANDIDATES]".to_string());
        values.insert("username", "alice".to_string());
        values.insert("platform", "telegram".to_string());

        let rendered = MATCH_INTRODUCTION.render(&values).unwrap();
        assert!(rendered.contains("I type {{candidates}} and {{username}}"));
        assert_eq!(rendered.matches("[CANDIDATES]").count(), 1);
    }

    #[test]
    fn test_render_reports_missing_keys() {
        let mut values = HashMap::new();
        values.insert("user_profile", "{}".to_string());

        let err = IDEAL_MATCH.render(&values).unwrap_err();
        assert_eq!(
            err,
            TemplateError::MissingKey {
                template: "ideal_match",
                keys: vec!["recent_messages".to_string()],
            }
        );
    }
}
