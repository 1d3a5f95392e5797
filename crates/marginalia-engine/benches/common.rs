// Benchmark helper functions - Rust's dead code analysis doesn't understand
// that these are used by benchmark files in the same directory
// See: https://users.rust-lang.org/t/cargo-rustc-benches-awarnings/110111/2
use marginalia_engine::{Node, StepMap};

#[allow(dead_code)]
pub fn generate_document(paragraphs: usize) -> Node {
    let lines: Vec<String> = (0..paragraphs)
        .map(|i| format!("Paragraph {i} with some content to type around."))
        .collect();
    Node::text_doc(&lines)
}

/// Alternating single-character inserts and deletes spread over the document,
/// like a burst of typing while an upload is in flight.
#[allow(dead_code)]
pub fn generate_edits(count: usize, doc_size: usize) -> Vec<StepMap> {
    (0..count)
        .map(|i| {
            let pos = (i * 37) % doc_size.max(1);
            if i % 2 == 0 {
                StepMap::replace(pos, 0, 1)
            } else {
                StepMap::replace(pos, 1, 0)
            }
        })
        .collect()
}
