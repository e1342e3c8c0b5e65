//! Mutation diffs
//!
//! Wrapping a mutator with [`diff_wrapper`] reports what it changed: both
//! snapshots are rendered to YAML and compared line by line.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use similar::{ChangeTag, TextDiff};

use crate::error::{ClientError, Result};
use crate::functional::Mutator;

/// Line diff of the YAML renderings of two objects, `None` when they render the same
pub fn diff_objects<R: Serialize>(left: &R, right: &R) -> Result<Option<String>> {
    let old = serde_yaml::to_string(left)?;
    let new = serde_yaml::to_string(right)?;

    if old == new {
        return Ok(None);
    }

    let diff = TextDiff::from_lines(&old, &new);
    let mut out = String::new();

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => '-',
            ChangeTag::Insert => '+',
            ChangeTag::Equal => ' ',
        };

        out.push(sign);
        out.push_str(&normalize_line(change.value()));
        out.push('\n');
    }

    Ok(Some(out))
}

/// Non-breaking spaces become plain spaces; trailing whitespace is dropped
fn normalize_line(line: &str) -> String {
    line.replace('\u{a0}', " ").trim_end().to_string()
}

/// Write the diff between two snapshots of a `kind` object.
///
/// Writes `No changes` when they match. Rendering failures are written to
/// the sink rather than returned; only I/O errors are.
pub fn format_diff<W, R>(
    w: &mut W,
    kind: &str,
    left_name: &str,
    right_name: &str,
    left: &R,
    right: &R,
) -> io::Result<()>
where
    W: Write + ?Sized,
    R: Serialize,
{
    match diff_objects(left, right) {
        Err(err) => writeln!(w, "couldn't format diff: {}", err),
        Ok(None) => writeln!(w, "No changes"),
        Ok(Some(diff)) => {
            writeln!(w, "{} Diff (-{} +{}):", kind, left_name, right_name)?;
            w.write_all(diff.as_bytes())
        }
    }
}

/// Wrap a mutator so each successful run writes its diff to `sink`.
///
/// If the wrapped mutator fails nothing is written.
pub fn diff_wrapper<R, W>(
    sink: Arc<Mutex<W>>,
    kind: impl Into<String>,
    mutator: Mutator<R>,
) -> Mutator<R>
where
    R: Clone + Serialize + 'static,
    W: Write + Send + 'static,
{
    let kind = kind.into();
    Mutator::new(move |obj: &mut R| {
        let before = obj.clone();
        mutator.apply(obj)?;

        let mut sink = sink
            .lock()
            .map_err(|_| ClientError::Diff("diff sink lock poisoned".to_string()))?;
        format_diff(&mut *sink, &kind, "old", "new", &before, obj)
            .map_err(|e| ClientError::Diff(e.to_string()))
    })
}
