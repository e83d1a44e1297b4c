//! Unit tests for custom command and skill discovery.

use std::fs;

use agent_conduit::custom::loader::{
    load_custom_commands, parse_front_matter, CommandScope,
};
use tempfile::TempDir;

// ── Front matter ─────────────────────────────────────────────────────────────

#[test]
fn front_matter_parses_description_and_hint() {
    let doc = "---\ndescription: Review a file\nargument-hint: <path>\n---\nReview $1 carefully.";
    let (matter, body) = parse_front_matter(doc);

    assert_eq!(matter.description.as_deref(), Some("Review a file"));
    assert_eq!(matter.argument_hint.as_deref(), Some("<path>"));
    assert_eq!(body, "Review $1 carefully.");
}

#[test]
fn document_without_front_matter_is_all_body() {
    let doc = "Just a template with $ARGUMENTS.";
    let (matter, body) = parse_front_matter(doc);

    assert!(matter.description.is_none());
    assert_eq!(body, doc);
}

#[test]
fn unterminated_front_matter_is_treated_as_body() {
    let doc = "---\ndescription: broken\nno closing delimiter";
    let (matter, body) = parse_front_matter(doc);

    assert!(matter.description.is_none());
    assert_eq!(body, doc);
}

#[test]
fn unknown_front_matter_keys_are_ignored() {
    let doc = "---\ndescription: ok\ncolor: blue\n---\nbody";
    let (matter, body) = parse_front_matter(doc);

    assert_eq!(matter.description.as_deref(), Some("ok"));
    assert_eq!(body, "body");
}

#[test]
fn front_matter_values_containing_colons_survive() {
    let doc = "---\ndescription: usage: run me\n---\nbody";
    let (matter, _) = parse_front_matter(doc);
    assert_eq!(matter.description.as_deref(), Some("usage: run me"));
}

// ── Discovery ────────────────────────────────────────────────────────────────

#[test]
fn workspace_commands_and_skills_are_discovered() {
    let workspace = TempDir::new().expect("tempdir");
    let commands_dir = workspace.path().join(".conduit/commands");
    let skill_dir = workspace.path().join(".conduit/skills/deploy");
    fs::create_dir_all(&commands_dir).expect("mkdir commands");
    fs::create_dir_all(&skill_dir).expect("mkdir skills");

    fs::write(
        commands_dir.join("greet.md"),
        "---\ndescription: Say hello\n---\nGreet $1 warmly.",
    )
    .expect("write command");
    fs::write(
        skill_dir.join("SKILL.md"),
        "---\ndescription: Deploy the service\nargument-hint: <env>\n---\nDeploy to $1.",
    )
    .expect("write skill");

    let commands = load_custom_commands(workspace.path(), ".conduit");

    let greet = commands
        .iter()
        .find(|c| c.name == "greet")
        .expect("greet command must be discovered");
    assert_eq!(greet.description.as_deref(), Some("Say hello"));
    assert_eq!(greet.template, "Greet $1 warmly.");
    assert_eq!(greet.scope, CommandScope::Workspace);

    let deploy = commands
        .iter()
        .find(|c| c.name == "deploy")
        .expect("deploy skill must be discovered");
    assert_eq!(deploy.argument_hint.as_deref(), Some("<env>"));
    assert_eq!(deploy.template, "Deploy to $1.");
}

#[test]
fn missing_directories_yield_no_workspace_commands() {
    let workspace = TempDir::new().expect("tempdir");
    let commands = load_custom_commands(workspace.path(), ".conduit");
    assert!(
        !commands
            .iter()
            .any(|c| c.scope == CommandScope::Workspace),
        "an empty workspace contributes no commands"
    );
}

#[test]
fn non_markdown_files_are_not_commands() {
    let workspace = TempDir::new().expect("tempdir");
    let commands_dir = workspace.path().join(".conduit/commands");
    fs::create_dir_all(&commands_dir).expect("mkdir");
    fs::write(commands_dir.join("notes.txt"), "not a template").expect("write");

    let commands = load_custom_commands(workspace.path(), ".conduit");
    assert!(!commands.iter().any(|c| c.name == "notes"));
}
