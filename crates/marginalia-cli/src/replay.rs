//! Replays a scripted editing session against a markdown document.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use marginalia_config::Config;
use marginalia_engine::markdown::{self, to_plain_text};
use marginalia_engine::plugins::{
    OperationEvent, OperationId, SuggestionEvent, SuggestionPlugin, SuggestionView, UploadMeta, UploadPlugin,
};
use marginalia_engine::{DecorationSpec, Editor, EditorState, Fragment, Node, PluginSet, Selection, Transaction};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Script {
    /// Initial cursor; the end of the first block when absent.
    pub cursor: Option<usize>,
    #[serde(default, rename = "action")]
    pub actions: Vec<Action>,
}

impl Script {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse script {}", path.display()))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Select { anchor: usize, head: Option<usize> },
    TypeText { text: String },
    Delete { from: usize, to: usize },
    Backspace,
    SplitBlock,
    StartUpload { name: String, file: PathBuf },
    ResolveUpload { name: String },
    FailUpload { name: String, error: String },
    CancelUpload { name: String },
    CommitSuggestion { text: String },
    CancelSuggestion,
}

impl Action {
    fn describe(&self) -> String {
        match self {
            Action::Select { anchor, head } => format!("select {anchor}..{}", head.unwrap_or(*anchor)),
            Action::TypeText { text } => format!("type {text:?}"),
            Action::Delete { from, to } => format!("delete {from}..{to}"),
            Action::Backspace => "backspace".to_string(),
            Action::SplitBlock => "split block".to_string(),
            Action::StartUpload { name, file } => format!("start upload {name} ({})", file.display()),
            Action::ResolveUpload { name } => format!("resolve upload {name}"),
            Action::FailUpload { name, error } => format!("fail upload {name}: {error}"),
            Action::CancelUpload { name } => format!("cancel upload {name}"),
            Action::CommitSuggestion { text } => format!("commit suggestion {text:?}"),
            Action::CancelSuggestion => "cancel suggestion".to_string(),
        }
    }
}

pub struct Replay {
    editor: Editor,
    config: Config,
    uploads: HashMap<String, (OperationId, PathBuf)>,
    names: HashMap<OperationId, String>,
    transcript: Vec<String>,
}

impl Replay {
    pub fn new(markdown: &str, config: Config, cursor: Option<usize>) -> Result<Self> {
        let doc = markdown::parse(markdown)?;
        let cursor = cursor.unwrap_or_else(|| doc.child(0).map_or(0, |block| 1 + block.content_size()));
        let plugins = PluginSet::new()
            .with(UploadPlugin::new(config.uploads.clone()))?
            .with(SuggestionPlugin::new(config.suggestion.clone())?)?;
        let state = EditorState::create(doc, Selection::cursor(cursor), plugins)?;
        Ok(Self {
            editor: Editor::new(state),
            config,
            uploads: HashMap::new(),
            names: HashMap::new(),
            transcript: Vec::new(),
        })
    }

    pub fn state(&self) -> &EditorState {
        self.editor.state()
    }

    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }

    pub fn run_all(&mut self, actions: &[Action]) -> Result<()> {
        for (index, action) in actions.iter().enumerate() {
            self.run(action)
                .with_context(|| format!("action {} ({}) failed", index + 1, action.describe()))?;
        }
        Ok(())
    }

    pub fn run(&mut self, action: &Action) -> Result<()> {
        log::debug!("{}", action.describe());
        self.transcript.push(format!("> {}", action.describe()));
        let state = self.editor.state();
        let tr = match action {
            Action::Select { anchor, head } => {
                let mut tr = state.tr();
                tr.set_selection(Selection::new(*anchor, head.unwrap_or(*anchor)))?;
                tr
            }
            Action::TypeText { text } => {
                let mut tr = state.tr();
                tr.type_text(text)?;
                tr
            }
            Action::Delete { from, to } => {
                let mut tr = state.tr();
                tr.delete(*from, *to)?;
                tr
            }
            Action::Backspace => backspace(state)?,
            Action::SplitBlock => {
                let mut tr = state.tr();
                tr.delete_selection()?;
                let pos = tr.selection().from();
                tr.split_block(pos, None)?;
                tr.set_selection(Selection::cursor(pos + 2))?;
                tr
            }
            Action::StartUpload { name, file } => {
                if self.uploads.contains_key(name) {
                    bail!("upload {name} was already started");
                }
                let path = self.config.upload_path(file);
                let (tr, id) = UploadPlugin::start_upload(state, path.display().to_string())?;
                self.names.insert(id, name.clone());
                self.uploads.insert(name.clone(), (id, path));
                tr
            }
            Action::ResolveUpload { name } => {
                let (id, path) = self.upload(name)?;
                let meta = match self.load_upload(&path) {
                    Ok(content) => UploadMeta::Resolve { id, content },
                    Err(error) => UploadMeta::Fail { id, error },
                };
                UploadPlugin::meta_transaction(state, meta)
            }
            Action::FailUpload { name, error } => {
                let (id, _) = self.upload(name)?;
                UploadPlugin::meta_transaction(
                    state,
                    UploadMeta::Fail {
                        id,
                        error: error.clone(),
                    },
                )
            }
            Action::CancelUpload { name } => {
                let (id, _) = self.upload(name)?;
                UploadPlugin::meta_transaction(state, UploadMeta::Cancel { id })
            }
            Action::CommitSuggestion { text } => {
                match SuggestionPlugin::commit_transaction(state, Fragment::from_node(Node::text(text)))? {
                    Some(tr) => tr,
                    None => {
                        self.transcript.push("  no active suggestion".to_string());
                        return Ok(());
                    }
                }
            }
            Action::CancelSuggestion => SuggestionPlugin::cancel_transaction(state),
        };
        self.dispatch(tr)
    }

    fn dispatch(&mut self, tr: Transaction) -> Result<()> {
        self.editor.dispatch(tr)?;
        let state = self.editor.state();
        let mut lines = Vec::new();
        if let Some(uploads) = UploadPlugin::state(state) {
            lines.extend(uploads.events().iter().map(|event| self.describe_upload(event)));
        }
        if let Some(suggestion) = SuggestionPlugin::state(state) {
            lines.extend(suggestion.events().iter().map(describe_suggestion));
        }
        self.transcript.extend(lines);
        Ok(())
    }

    fn upload(&self, name: &str) -> Result<(OperationId, PathBuf)> {
        match self.uploads.get(name) {
            Some((id, path)) => Ok((*id, path.clone())),
            None => bail!("no upload named {name}"),
        }
    }

    /// Check the file against the upload limits and build the node that replaces the placeholder.
    fn load_upload(&self, path: &Path) -> Result<Fragment, String> {
        let metadata = std::fs::metadata(path).map_err(|err| format!("{}: {err}", path.display()))?;
        self.config
            .uploads
            .validate(mime_type(path), metadata.len())
            .map_err(|rejection| rejection.to_string())?;
        let alt = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Fragment::from_node(Node::image(path.display().to_string(), alt)))
    }

    fn name(&self, id: &OperationId) -> String {
        self.names.get(id).cloned().unwrap_or_else(|| id.to_string())
    }

    fn describe_upload(&self, event: &OperationEvent) -> String {
        match event {
            OperationEvent::Started { id, pos } => format!("  upload {} started at {pos}", self.name(id)),
            OperationEvent::Resolved { id, pos } => format!("  upload {} resolved at {pos}", self.name(id)),
            OperationEvent::Failed { id, error } => format!("  upload {} failed: {error}", self.name(id)),
            OperationEvent::Cancelled { id, reason } => {
                format!("  upload {} cancelled ({reason:?})", self.name(id))
            }
            OperationEvent::Rejected { id, reason } => {
                format!("  upload {} rejected ({reason:?})", self.name(id))
            }
            OperationEvent::Ignored { id } => format!("  upload {} ignored", self.name(id)),
        }
    }

    /// Final document, selection, decorations and upload statuses.
    pub fn report(&self) -> String {
        let state = self.editor.state();
        let selection = state.selection();
        let mut out = String::new();
        out.push_str(&self.transcript.join("\n"));
        out.push_str("\n\n");
        out.push_str(&to_plain_text(state.doc()));
        out.push_str(&format!("\n\nselection: {}..{}\n", selection.anchor, selection.head));

        let decorations = state.decorations();
        if !decorations.is_empty() {
            out.push_str("decorations:\n");
        }
        let uploads_by_id: HashMap<String, &str> = self
            .names
            .iter()
            .map(|(id, name)| (id.to_string(), name.as_str()))
            .collect();
        for decoration in decorations.iter() {
            let place = match decoration.spec() {
                DecorationSpec::Widget { pos, .. } => format!("widget at {pos}"),
                DecorationSpec::Inline { from, to } => format!("inline {from}..{to}"),
                DecorationSpec::Node { from, to } => format!("node {from}..{to}"),
            };
            let class = decoration.attr("class").unwrap_or("-");
            match decoration
                .attr("data-upload-id")
                .and_then(|id| uploads_by_id.get(id))
            {
                Some(name) => out.push_str(&format!("  {place} {class} ({name})\n")),
                None => out.push_str(&format!("  {place} {class}\n")),
            }
        }

        let mut names: Vec<(&String, &(OperationId, PathBuf))> = self.uploads.iter().collect();
        names.sort_by(|a, b| a.0.cmp(b.0));
        for (name, (id, _)) in names {
            if let Some(status) = UploadPlugin::state(state).and_then(|uploads| uploads.status(*id)) {
                out.push_str(&format!("upload {name}: {status:?}\n"));
            }
        }
        out
    }
}

fn describe_view(view: &SuggestionView) -> String {
    format!("{}{} at {}..{}", view.trigger, view.query, view.range.start, view.range.end)
}

fn describe_suggestion(event: &SuggestionEvent) -> String {
    match event {
        SuggestionEvent::Started(view) => format!("  suggestion started: {}", describe_view(view)),
        SuggestionEvent::Updated(view) => format!("  suggestion updated: {}", describe_view(view)),
        SuggestionEvent::Committed(view) => format!("  suggestion committed: {}", describe_view(view)),
        SuggestionEvent::Cancelled { view, reason } => {
            format!("  suggestion cancelled ({reason:?}): {}", describe_view(view))
        }
    }
}

/// Delete the selection, the character before the cursor, or the block
/// boundary when the cursor sits at the start of a textblock.
fn backspace(state: &EditorState) -> Result<Transaction> {
    let mut tr = state.tr();
    let selection = state.selection();
    if !selection.is_empty() {
        tr.delete_selection()?;
        return Ok(tr);
    }
    let pos = selection.head;
    let doc = state.doc();
    let rpos = doc.resolve(pos)?;
    if rpos.parent_offset() == 0 {
        if pos >= 1 && doc.resolve(pos - 1)?.node_before().is_some_and(Node::is_textblock) {
            tr.join(pos - 1)?;
        }
        return Ok(tr);
    }
    let width = match rpos.node_before() {
        Some(node) if node.is_atom() => 1,
        _ => doc
            .text_between(pos - rpos.parent_offset(), pos, "")
            .chars()
            .next_back()
            .map_or(1, char::len_utf8),
    };
    tr.delete(pos - width, pos)?;
    Ok(tr)
}

fn mime_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("pdf") => "application/pdf",
        Some("txt" | "md") => "text/plain",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn replay(markdown: &str, script: &str, config: Config) -> Replay {
        let script: Script = toml::from_str(script).unwrap();
        let mut replay = Replay::new(markdown, config, script.cursor).unwrap();
        replay.run_all(&script.actions).unwrap();
        replay
    }

    #[test]
    fn parses_tagged_actions() {
        let script: Script = toml::from_str(
            r#"
cursor = 3

[[action]]
type = "type_text"
text = "hi"

[[action]]
type = "backspace"

[[action]]
type = "start_upload"
name = "cat"
file = "cat.png"
"#,
        )
        .unwrap();

        assert_eq!(script.cursor, Some(3));
        assert_eq!(
            script.actions,
            vec![
                Action::TypeText { text: "hi".into() },
                Action::Backspace,
                Action::StartUpload {
                    name: "cat".into(),
                    file: PathBuf::from("cat.png"),
                },
            ]
        );
    }

    #[test]
    fn upload_resolves_from_the_upload_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("cat.png"), [0u8; 4]).unwrap();
        let config = Config {
            upload_dir: Some(dir.path().to_path_buf()),
            ..Config::default()
        };
        let replay = replay(
            "Hello",
            r#"
[[action]]
type = "start_upload"
name = "cat"
file = "cat.png"

[[action]]
type = "type_text"
text = " world "

[[action]]
type = "resolve_upload"
name = "cat"
"#,
            config,
        );

        assert_eq!(to_plain_text(replay.state().doc()), "Hello world \u{fffc}");
        assert_eq!(
            replay.transcript(),
            &[
                "> start upload cat (cat.png)".to_string(),
                "  upload cat started at 6".to_string(),
                "> type \" world \"".to_string(),
                "> resolve upload cat".to_string(),
                "  upload cat resolved at 13".to_string(),
            ]
        );
        assert!(replay.report().ends_with("upload cat: Resolved\n"));
    }

    #[test]
    fn missing_or_rejected_files_fail_the_upload() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes.pdf"), b"%PDF").unwrap();
        let config = Config {
            upload_dir: Some(dir.path().to_path_buf()),
            ..Config::default()
        };
        let replay = replay(
            "Hi",
            r#"
[[action]]
type = "start_upload"
name = "gone"
file = "gone.png"

[[action]]
type = "start_upload"
name = "pdf"
file = "notes.pdf"

[[action]]
type = "resolve_upload"
name = "gone"

[[action]]
type = "resolve_upload"
name = "pdf"
"#,
            config,
        );

        let failures: Vec<&String> = replay
            .transcript()
            .iter()
            .filter(|line| line.contains("failed"))
            .collect();
        assert_eq!(failures.len(), 2);
        assert!(failures[0].starts_with("  upload gone failed: "));
        assert!(failures[1].starts_with("  upload pdf failed: "));
        assert_eq!(to_plain_text(replay.state().doc()), "Hi");
        assert!(replay.state().decorations().is_empty());
    }

    #[test]
    fn suggestion_session_is_reported_and_committed() {
        let replay = replay(
            "Ask",
            r#"
[[action]]
type = "type_text"
text = " @"

[[action]]
type = "type_text"
text = "bo"

[[action]]
type = "commit_suggestion"
text = "@bob"
"#,
            Config::default(),
        );

        insta::assert_snapshot!(replay.report(), @r#"
        > type " @"
          suggestion started: @ at 5..6
        > type "bo"
          suggestion updated: @bo at 5..8
        > commit suggestion "@bob"
          suggestion committed: @bo at 5..8

        Ask @bob

        selection: 9..9
        "#);
    }

    #[test]
    fn backspace_deletes_characters_then_joins_blocks() {
        let replay = replay(
            "one\n\ntwo",
            r#"
cursor = 7

[[action]]
type = "backspace"

[[action]]
type = "backspace"
"#,
            Config::default(),
        );

        assert_eq!(to_plain_text(replay.state().doc()), "onewo");
        assert_eq!(replay.state().selection(), Selection::cursor(4));
    }

    #[test]
    fn demo_session_lands_the_screenshot_after_the_mention() {
        let demo = Path::new(env!("CARGO_MANIFEST_DIR")).join("demo");
        let markdown = std::fs::read_to_string(demo.join("notes.md")).unwrap();
        let script = Script::load(&demo.join("session.toml")).unwrap();
        let config = Config {
            upload_dir: Some(PathBuf::from(env!("CARGO_MANIFEST_DIR"))),
            ..Config::default()
        };
        let mut replay = Replay::new(&markdown, config, script.cursor).unwrap();
        replay.run_all(&script.actions).unwrap();

        assert_eq!(
            to_plain_text(replay.state().doc()),
            "Standup\nYesterday I fixed the login page. Thanks @sam\u{fffc}"
        );
        assert!(replay.transcript().contains(&"  upload screenshot resolved at 55".to_string()));
    }

    #[test]
    fn unknown_upload_names_abort_the_replay() {
        let script: Script = toml::from_str(
            r#"
[[action]]
type = "cancel_upload"
name = "nope"
"#,
        )
        .unwrap();
        let mut replay = Replay::new("Hi", Config::default(), None).unwrap();

        let err = replay.run_all(&script.actions).unwrap_err();

        assert!(format!("{err:#}").contains("no upload named nope"));
    }
}
