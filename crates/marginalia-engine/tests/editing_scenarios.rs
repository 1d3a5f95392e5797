use marginalia_engine::markdown::{parse, to_plain_text};
use marginalia_engine::plugins::{
    DismissReason, OperationEvent, SuggestionConfig, SuggestionEvent, SuggestionPlugin, UploadConfig, UploadMeta,
    UploadPlugin,
};
use marginalia_engine::{Editor, EditorState, Fragment, Node, PluginSet, Selection, StateError, Transaction};
use pretty_assertions::assert_eq;

fn fixture(name: &str) -> Node {
    let md = std::fs::read_to_string(format!(
        "{}/tests/fixtures/{name}.md",
        env!("CARGO_MANIFEST_DIR")
    ))
    .unwrap();
    parse(&md).unwrap()
}

fn editor(doc: Node, cursor: usize) -> Editor {
    let plugins = PluginSet::new()
        .with(UploadPlugin::new(UploadConfig::default()))
        .unwrap()
        .with(SuggestionPlugin::new(SuggestionConfig::default()).unwrap())
        .unwrap();
    Editor::new(EditorState::create(doc, Selection::cursor(cursor), plugins).unwrap())
}

fn type_text(editor: &mut Editor, text: &str) {
    let mut tr = editor.tr();
    tr.type_text(text).unwrap();
    editor.dispatch(tr).unwrap();
}

fn image() -> Fragment {
    Fragment::from_node(Node::image("diagram.png", "[img]"))
}

#[test]
fn upload_resolves_after_the_text_typed_at_its_anchor() {
    // "Hello " occupies 1..7 inside its paragraph.
    let mut editor = editor(Node::text_doc(&["Hello "]), 7);
    let (tr, id) = UploadPlugin::start_upload(editor.state(), "diagram.png").unwrap();
    editor.dispatch(tr).unwrap();

    type_text(&mut editor, "world ");

    let tr = UploadPlugin::meta_transaction(editor.state(), UploadMeta::Resolve { id, content: image() });
    editor.dispatch(tr).unwrap();

    assert_eq!(to_plain_text(editor.state().doc()), "Hello world \u{fffc}");
}

#[test]
fn upload_and_suggestion_share_one_transaction_stream() {
    let mut editor = editor(fixture("notes"), 1);
    let end_of_quote = {
        let doc = editor.state().doc();
        // heading, paragraph, then the quoted paragraph's content end
        let heading = doc.child(0).unwrap().size();
        let paragraph = doc.child(1).unwrap().size();
        let quote = doc.child(2).unwrap();
        heading + paragraph + 1 + quote.child(0).unwrap().size() - 1
    };
    let mut tr = editor.tr();
    tr.set_selection(Selection::cursor(end_of_quote)).unwrap();
    editor.dispatch(tr).unwrap();

    let (tr, id) = UploadPlugin::start_upload(editor.state(), "diagram.png").unwrap();
    editor.dispatch(tr).unwrap();

    type_text(&mut editor, " /");
    assert!(SuggestionPlugin::view(editor.state()).is_some());
    type_text(&mut editor, "fig");

    // The placeholder stays after the typed text, the session covers "/fig".
    let range = SuggestionPlugin::commit_range(editor.state()).unwrap();
    let placeholder = UploadPlugin::find_placeholder(editor.state(), id).unwrap();
    assert_eq!(range.end, placeholder);
    assert_eq!(
        editor.state().doc().text_between(range.start, range.end, ""),
        "/fig"
    );

    let tr = SuggestionPlugin::commit_transaction(editor.state(), Fragment::from_node(Node::text("figure:")))
        .unwrap()
        .unwrap();
    editor.dispatch(tr).unwrap();

    let tr = UploadPlugin::meta_transaction(editor.state(), UploadMeta::Resolve { id, content: image() });
    editor.dispatch(tr).unwrap();

    assert_eq!(
        to_plain_text(editor.state().doc()),
        "Meeting notes\nDiscussed the upload flow with everyone.\nRemember to attach the diagram. figure:\u{fffc}\nraw / text @ here"
    );
}

#[test]
fn upload_resolved_during_a_session_stays_out_of_the_query() {
    let mut editor = editor(Node::text_doc(&["Hello "]), 7);
    let (tr, id) = UploadPlugin::start_upload(editor.state(), "diagram.png").unwrap();
    editor.dispatch(tr).unwrap();
    type_text(&mut editor, "/");
    type_text(&mut editor, "fi");

    let tr = UploadPlugin::meta_transaction(editor.state(), UploadMeta::Resolve { id, content: image() });
    editor.dispatch(tr).unwrap();

    let view = SuggestionPlugin::view(editor.state()).unwrap();
    assert_eq!(view.query, "fi");
    assert_eq!(view.range, 7..10);

    let tr = SuggestionPlugin::commit_transaction(editor.state(), Fragment::from_node(Node::text("figure")))
        .unwrap()
        .unwrap();
    editor.dispatch(tr).unwrap();
    assert_eq!(to_plain_text(editor.state().doc()), "Hello figure\u{fffc}");
}

#[test]
fn triggers_inside_code_blocks_never_open_a_session() {
    let doc = fixture("notes");
    let code_start = doc.content_size() - 1 - doc.child(3).unwrap().content_size();
    let mut editor = editor(doc, code_start);
    type_text(&mut editor, " /");
    assert!(SuggestionPlugin::view(editor.state()).is_none());
}

#[test]
fn deleting_the_paragraph_cancels_both_consumers() {
    let mut editor = editor(Node::text_doc(&["intro", "draft "]), 14);
    let (tr, id) = UploadPlugin::start_upload(editor.state(), "x.png").unwrap();
    editor.dispatch(tr).unwrap();
    type_text(&mut editor, "/");
    type_text(&mut editor, "ab");

    // Drop the whole second paragraph, trigger and placeholder included.
    let mut tr = editor.tr();
    tr.delete(7, 18).unwrap();
    tr.set_selection(Selection::cursor(6)).unwrap();
    editor.dispatch(tr).unwrap();

    let uploads = UploadPlugin::state(editor.state()).unwrap();
    assert!(matches!(uploads.events(), [OperationEvent::Cancelled { id: cancelled, .. }] if *cancelled == id));
    let suggestion = SuggestionPlugin::state(editor.state()).unwrap();
    assert!(matches!(
        suggestion.events(),
        [SuggestionEvent::Cancelled {
            reason: DismissReason::TriggerRemoved,
            ..
        }]
    ));
    assert!(editor.state().decorations().is_empty());
}

#[test]
fn failed_dispatch_keeps_the_previous_snapshot() {
    let mut editor = editor(Node::text_doc(&["abc"]), 4);
    let stale = editor.tr();
    type_text(&mut editor, "d");
    let err = editor.dispatch(stale).unwrap_err();
    assert_eq!(err, StateError::StaleBase);
    assert_eq!(editor.state().doc(), &Node::text_doc(&["abcd"]));
}

#[test]
fn undoing_a_transaction_restores_the_document() {
    let doc = fixture("notes");
    let mut tr = Transaction::new(doc.clone(), Selection::cursor(1));
    tr.insert_text(1, "Weekly ").unwrap();
    tr.split_block(5, None).unwrap();
    tr.delete(8, 11).unwrap();

    let mut undo = Transaction::new(tr.doc().clone(), tr.selection());
    for step in tr.inverted_steps().unwrap() {
        undo.step(step).unwrap();
    }
    assert_eq!(undo.doc(), &doc);
}
