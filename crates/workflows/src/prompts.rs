//! Instruction text for the one-click file assistant actions.

/// The canned refactor actions offered on a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefactorKind {
    Optimize,
    AddComments,
    FindBugs,
}

impl RefactorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefactorKind::Optimize => "optimize",
            RefactorKind::AddComments => "comments",
            RefactorKind::FindBugs => "bug",
        }
    }

    /// Capitalized form used in user-facing feedback.
    pub fn display_name(&self) -> &'static str {
        match self {
            RefactorKind::Optimize => "Optimize",
            RefactorKind::AddComments => "Comments",
            RefactorKind::FindBugs => "Bug",
        }
    }

    /// The instruction handed to the refactor call.
    pub fn instruction(&self) -> &'static str {
        match self {
            RefactorKind::Optimize => "Optimize this code for performance and readability.",
            RefactorKind::AddComments => "Add helpful JSDoc/CSS comments to this file.",
            RefactorKind::FindBugs => {
                "Check for potential bugs or security vulnerabilities and fix them."
            }
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "optimize" => Some(RefactorKind::Optimize),
            "comments" => Some(RefactorKind::AddComments),
            "bug" | "bugs" => Some(RefactorKind::FindBugs),
            _ => None,
        }
    }
}

/// Prompt for the explain-this-file action.
pub fn explain_prompt(name: &str, code: &str) -> String {
    format!(
        "Explain exactly what this file does in a concise, developer-friendly way.\nFILE: {name}\nCODE:\n{code}"
    )
}
