//! Deployment description composition
//!
//! Builds the human summary attached to every event:
//!
//! ```text
//! Version: 1.4.0
//! Schema: v001-v015
//! Branch: main
//! Commit: ab12cd3
//! + 3 uncommitted: (+40/-7) - index.ts (+22/-1), app.ts (+18/-6), ...
//! User: Dana Deploy
//! ```
//!
//! The service caps descriptions at 255 characters, so the uncommitted
//! line is bin-fit greedily into whatever budget the fixed lines leave.
//! Composition is a pure function: same inputs, same string.

use crate::git::UncommittedChanges;
use crate::models::event::DeploymentState;

/// Hard limit imposed by the events API
pub const MAX_DESCRIPTION_LEN: usize = 255;

/// Budgets smaller than this produce a useless fragment list, so the
/// uncommitted line is dropped entirely instead
const MIN_UNCOMMITTED_BUDGET: usize = 30;

/// Branch names longer than this are truncated with an ellipsis
const MAX_BRANCH_LEN: usize = 30;

const OVERFLOW_MARKER: &str = ", ...";

/// Inputs for composing a deployment description
#[derive(Debug, Clone)]
pub struct DescriptionContext {
    pub state: DeploymentState,
    pub version: Option<String>,
    pub schema_version: Option<String>,
    pub branch: String,
    pub commit: String,
    pub uncommitted: Option<UncommittedChanges>,
    pub user: String,
}

/// Compose the description for an event
pub fn compose(ctx: &DescriptionContext) -> String {
    let mut lines = Vec::new();

    // Version is only meaningful once a deploy has succeeded
    if ctx.state == DeploymentState::Successful {
        if let Some(version) = &ctx.version {
            lines.push(format!("Version: {}", version));
        }
    }

    if let Some(schema) = &ctx.schema_version {
        lines.push(format!("Schema: {}", schema));
    }

    lines.push(format!("Branch: {}", truncate_branch(&ctx.branch)));
    lines.push(format!("Commit: {}", ctx.commit));

    let user_line = format!("User: {}", ctx.user);

    // Exact budget left for the uncommitted line: the full limit minus the
    // fixed lines, the user line, and the two separators around it
    let fixed = lines.join("\n");
    let budget = MAX_DESCRIPTION_LEN
        .saturating_sub(char_len(&fixed))
        .saturating_sub(char_len(&user_line))
        .saturating_sub(2);

    if let Some(changes) = &ctx.uncommitted {
        if budget > MIN_UNCOMMITTED_BUDGET {
            if let Some(line) = format_uncommitted_line(changes, budget) {
                lines.push(line);
            }
        }
    }

    lines.push(user_line);
    let description = lines.join("\n");

    // Safety net; unreachable when the budget arithmetic holds
    if char_len(&description) > MAX_DESCRIPTION_LEN {
        let truncated: String = description.chars().take(MAX_DESCRIPTION_LEN - 3).collect();
        return truncated + "...";
    }
    description
}

/// Greedily fit per-file fragments into the given budget
///
/// Order follows the input file list; this is a first-fit scan, not an
/// optimal packing. Returns None when not even the prefix fits.
fn format_uncommitted_line(changes: &UncommittedChanges, max_len: usize) -> Option<String> {
    let base = format!(
        "+ {} uncommitted: (+{}/-{}) - ",
        changes.count, changes.additions, changes.deletions
    );
    if char_len(&base) + 3 > max_len {
        return None;
    }
    let remaining = max_len - char_len(&base);

    let fragments: Vec<String> = changes
        .files
        .iter()
        .map(|f| format!("{} (+{}/-{})", basename(&f.path), f.additions, f.deletions))
        .collect();

    let mut fitted: Vec<&str> = Vec::new();
    let mut fitted_len = 0;
    for (idx, fragment) in fragments.iter().enumerate() {
        let candidate_len = if fitted.is_empty() {
            char_len(fragment)
        } else {
            fitted_len + 2 + char_len(fragment)
        };

        // Reserve room for the overflow marker while more files remain
        let has_more = idx + 1 < fragments.len();
        let required = candidate_len + if has_more { char_len(OVERFLOW_MARKER) } else { 0 };

        if required > remaining {
            break;
        }
        fitted.push(fragment.as_str());
        fitted_len = candidate_len;
    }

    if fitted.is_empty() {
        return Some(base + "...");
    }

    let mut files_str = fitted.join(", ");
    if fitted.len() < fragments.len() {
        files_str.push_str(OVERFLOW_MARKER);
    }
    Some(base + &files_str)
}

fn truncate_branch(branch: &str) -> String {
    if char_len(branch) > MAX_BRANCH_LEN {
        let truncated: String = branch.chars().take(MAX_BRANCH_LEN - 3).collect();
        truncated + "..."
    } else {
        branch.to_string()
    }
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
