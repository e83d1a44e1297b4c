//! Discovery of user-authored commands and skills.
//!
//! Commands are markdown templates at `<scope>/<dot-dir>/commands/*.md`;
//! skills are `<scope>/<dot-dir>/skills/<name>/SKILL.md`. Two scopes are
//! scanned: the session workspace and the user's home directory, with the
//! workspace shadowing home on name collision.
//!
//! Files may start with a front-matter block delimited by `---` lines,
//! carrying `description` and `argument-hint` keys; the markdown body
//! after the block is the template text. Loading failures degrade to an
//! empty or partial listing and are logged — never fatal to a prompt.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::warn;

/// Scope a custom command was discovered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandScope {
    /// The session's workspace directory. Shadows home on collision.
    Workspace,
    /// The user's home directory.
    Home,
}

/// One user-authored command or skill template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomCommand {
    /// Invocation name (file stem or skill directory name).
    pub name: String,
    /// `description` front-matter value.
    pub description: Option<String>,
    /// `argument-hint` front-matter value.
    pub argument_hint: Option<String>,
    /// Template text (markdown body after front matter).
    pub template: String,
    /// Scope the definition came from.
    pub scope: CommandScope,
}

/// Parsed front matter plus remaining body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrontMatter {
    /// `description` key, when present.
    pub description: Option<String>,
    /// `argument-hint` key, when present.
    pub argument_hint: Option<String>,
}

/// Load all custom commands and skills visible from `workspace_root`.
///
/// Home-scoped definitions are loaded first so that workspace-scoped ones
/// shadow them. Failures are logged and skipped.
#[must_use]
pub fn load_custom_commands(workspace_root: &Path, dot_dir: &str) -> Vec<CustomCommand> {
    let mut by_name: BTreeMap<String, CustomCommand> = BTreeMap::new();

    let mut scopes: Vec<(PathBuf, CommandScope)> = Vec::new();
    if let Some(home) = dirs::home_dir() {
        scopes.push((home, CommandScope::Home));
    }
    scopes.push((workspace_root.to_path_buf(), CommandScope::Workspace));

    for (root, scope) in scopes {
        let base = root.join(dot_dir);
        for command in scan_commands(&base.join("commands"), scope) {
            by_name.insert(command.name.clone(), command);
        }
        for skill in scan_skills(&base.join("skills"), scope) {
            by_name.insert(skill.name.clone(), skill);
        }
    }

    by_name.into_values().collect()
}

/// Split a markdown document into front matter and body.
///
/// Front matter is an optional leading block delimited by `---` lines,
/// holding `key: value` pairs. Documents without a block yield a default
/// [`FrontMatter`] and the full text as body.
#[must_use]
pub fn parse_front_matter(text: &str) -> (FrontMatter, String) {
    let mut lines = text.lines();
    if lines.next().map(str::trim) != Some("---") {
        return (FrontMatter::default(), text.to_owned());
    }

    let mut matter = FrontMatter::default();
    let mut body_lines: Vec<&str> = Vec::new();
    let mut in_matter = true;

    for line in lines {
        if in_matter {
            if line.trim() == "---" {
                in_matter = false;
                continue;
            }
            if let Some((key, value)) = line.split_once(':') {
                let value = value.trim().to_owned();
                match key.trim() {
                    "description" => matter.description = Some(value),
                    "argument-hint" => matter.argument_hint = Some(value),
                    _ => {}
                }
            }
            continue;
        }
        body_lines.push(line);
    }

    if in_matter {
        // Unterminated front matter — treat the whole document as body.
        return (FrontMatter::default(), text.to_owned());
    }

    (matter, body_lines.join("\n").trim_start().to_owned())
}

// ── Private helpers ───────────────────────────────────────────────────────────

/// Scan `dir/*.md` command templates. Name is the file stem.
fn scan_commands(dir: &Path, scope: CommandScope) -> Vec<CustomCommand> {
    glob_files(&dir.join("*.md"))
        .into_iter()
        .filter_map(|path| {
            let name = path.file_stem()?.to_str()?.to_owned();
            read_command(&path, name, scope)
        })
        .collect()
}

/// Scan `dir/*/SKILL.md` skill templates. Name is the directory name.
fn scan_skills(dir: &Path, scope: CommandScope) -> Vec<CustomCommand> {
    glob_files(&dir.join("*/SKILL.md"))
        .into_iter()
        .filter_map(|path| {
            let name = path.parent()?.file_name()?.to_str()?.to_owned();
            read_command(&path, name, scope)
        })
        .collect()
}

/// Expand a glob pattern, logging and skipping anything unreadable.
fn glob_files(pattern: &Path) -> Vec<PathBuf> {
    let Some(pattern) = pattern.to_str() else {
        return Vec::new();
    };

    match glob::glob(pattern) {
        Ok(paths) => paths
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(err) => {
                    warn!(%err, "skipping unreadable custom command path");
                    None
                }
            })
            .collect(),
        Err(err) => {
            warn!(%err, pattern, "invalid custom command glob pattern");
            Vec::new()
        }
    }
}

/// Read and parse one template file.
fn read_command(path: &Path, name: String, scope: CommandScope) -> Option<CustomCommand> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            warn!(path = %path.display(), %err, "failed to read custom command file");
            return None;
        }
    };

    let (matter, body) = parse_front_matter(&text);
    Some(CustomCommand {
        name,
        description: matter.description,
        argument_hint: matter.argument_hint,
        template: body,
        scope,
    })
}
