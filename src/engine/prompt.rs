//! Writing options and prompt construction.
//!
//! Each preset pairs a short prompt prefix with a system instruction
//! that asks the model to answer with the error sentinel when the
//! selection does not fit the request.

use super::EngineError;
use super::sanitizer::ERROR_SENTINEL;

/// Built-in writing options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Preset {
    Proofread,
    Rewrite,
    Friendly,
    Professional,
    Concise,
    Summary,
    KeyPoints,
    Table,
}

impl Preset {
    fn prefix(self) -> &'static str {
        match self {
            Preset::Proofread => "Proofread this:\n\n",
            Preset::Rewrite => "Rewrite this:\n\n",
            Preset::Friendly => "Make this more friendly:\n\n",
            Preset::Professional => "Make this more professional:\n\n",
            Preset::Concise => "Make this more concise:\n\n",
            Preset::Summary => "Summarize this:\n\n",
            Preset::KeyPoints => "Extract the key points from this:\n\n",
            Preset::Table => "Convert this into a table:\n\n",
        }
    }

    fn role(self) -> &'static str {
        match self {
            Preset::Proofread => {
                "You are a careful proofreader. Fix grammar, spelling and punctuation \
                 while preserving the original style and structure. Return only the corrected text."
            }
            Preset::Rewrite => {
                "You are a writing assistant. Improve the wording of the text. \
                 Return only the rewritten text."
            }
            Preset::Friendly => {
                "You are a writing assistant. Rewrite the text to sound warmer and more approachable. \
                 Return only the rewritten text."
            }
            Preset::Professional => {
                "You are a writing assistant. Rewrite the text in a more formal, professional register. \
                 Return only the rewritten text."
            }
            Preset::Concise => {
                "You are a writing assistant. Shorten the text without losing essential information. \
                 Return only the condensed text."
            }
            Preset::Summary => {
                "You are a summarization assistant. Give a clear, concise summary of the text. \
                 Return only the summary."
            }
            Preset::KeyPoints => {
                "You are an analysis assistant. List only the essential points of the text."
            }
            Preset::Table => {
                "You are a conversion assistant. Turn the text into a structured table. \
                 Return only the formatted table."
            }
        }
    }
}

const CUSTOM_PREFIX: &str = "Apply the following change to this text:\n\n";

const CUSTOM_ROLE: &str = "You are a versatile writing assistant. Apply exactly the requested \
     change to the given text. Return only the modified content.";

/// Used when there is no selection and the custom instruction is the
/// whole prompt.
const STANDALONE_ROLE: &str = "You are a helpful assistant to the user. The user cannot \
     follow-up with you after your single response to them, so do not ask them questions.";

/// What to do with the selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Preset(Preset),
    /// Free-form change described by the user.
    Custom(String),
}

/// Input for one backend request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRequest {
    pub system_instruction: String,
    pub prompt: String,
}

impl Instruction {
    /// Build the backend request for `selected`.
    ///
    /// An empty (or whitespace-only) selection is only valid with a
    /// custom instruction, which is then sent on its own.
    pub fn build(&self, selected: &str) -> Result<PromptRequest, EngineError> {
        let incompatible = format!(
            "If the text is incompatible with the request, reply with exactly \
             {ERROR_SENTINEL}. No additional comments."
        );

        if selected.trim().is_empty() {
            return match self {
                Instruction::Custom(change) if !change.trim().is_empty() => Ok(PromptRequest {
                    system_instruction: STANDALONE_ROLE.to_owned(),
                    prompt: change.clone(),
                }),
                _ => Err(EngineError::EmptySelection),
            };
        }

        let request = match self {
            Instruction::Preset(preset) => PromptRequest {
                system_instruction: format!("{} {incompatible}", preset.role()),
                prompt: format!("{}{selected}", preset.prefix()),
            },
            Instruction::Custom(change) => PromptRequest {
                system_instruction: format!("{CUSTOM_ROLE} {incompatible}"),
                prompt: format!("{CUSTOM_PREFIX}Described change: {change}\n\nText: {selected}"),
            },
        };
        Ok(request)
    }
}
