//! Superlog I/O.
//!
//! A superlog is newline-delimited JSON: one event record per line, in
//! replay order. Blank lines are skipped. Decode errors carry the 1-based
//! line number of the offending record.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use sdnfuzz_events::{Event, EventCodec};

use crate::error::SuperlogError;

/// Reads and decodes every record of a superlog file, in file order.
pub fn read_superlog(
    path: impl AsRef<Path>,
    codec: &EventCodec,
) -> Result<Vec<Event>, SuperlogError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| SuperlogError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let events = parse_superlog(BufReader::new(file), codec)?;
    tracing::debug!(path = %path.display(), events = events.len(), "read superlog");
    Ok(events)
}

/// Decodes superlog records from any buffered reader.
pub fn parse_superlog(reader: impl BufRead, codec: &EventCodec) -> Result<Vec<Event>, SuperlogError> {
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event = codec
            .decode_line(&line)
            .map_err(|source| SuperlogError::Decode {
                line: index + 1,
                source,
            })?;
        events.push(event);
    }
    Ok(events)
}

/// Appends events to a superlog as they happen.
///
/// Each [`append`](Self::append) writes one complete line. Call
/// [`flush`](Self::flush) before handing the file to a reader.
pub struct SuperlogWriter<W: Write> {
    out: W,
    codec: EventCodec,
    written: usize,
}

impl<W: Write> SuperlogWriter<W> {
    pub fn new(out: W, codec: EventCodec) -> Self {
        Self {
            out,
            codec,
            written: 0,
        }
    }

    pub fn append(&mut self, event: &Event) -> Result<(), SuperlogError> {
        let line = self
            .codec
            .encode_line(event)
            .map_err(|source| SuperlogError::Encode {
                label: event.label().clone(),
                source,
            })?;
        writeln!(self.out, "{line}")?;
        self.written += 1;
        tracing::trace!(label = %event.label(), class = event.class(), "appended to superlog");
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), SuperlogError> {
        self.out.flush()?;
        Ok(())
    }

    /// Number of events appended so far.
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl SuperlogWriter<BufWriter<File>> {
    /// Creates (or truncates) a superlog file.
    pub fn create(path: impl AsRef<Path>, codec: EventCodec) -> Result<Self, SuperlogError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| SuperlogError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(BufWriter::new(file), codec))
    }

    /// Opens a superlog file for appending, creating it if needed.
    pub fn open_append(path: impl AsRef<Path>, codec: EventCodec) -> Result<Self, SuperlogError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| SuperlogError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::new(BufWriter::new(file), codec))
    }
}

/// Writes `events` as a complete superlog file.
pub fn write_superlog<'a>(
    path: impl AsRef<Path>,
    events: impl IntoIterator<Item = &'a Event>,
    codec: &EventCodec,
) -> Result<usize, SuperlogError> {
    let mut writer = SuperlogWriter::create(path, codec.clone())?;
    for event in events {
        writer.append(event)?;
    }
    writer.flush()?;
    Ok(writer.written())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdnfuzz_events::{CodecError, LabelRegistry, SwitchFailure, SwitchRecovery};
    use sdnfuzz_types::Dpid;
    use std::sync::Arc;

    fn codec() -> EventCodec {
        EventCodec::new(Arc::new(LabelRegistry::new()))
    }

    #[test]
    fn writer_emits_one_line_per_event() {
        let codec = codec();
        let registry = Arc::clone(codec.registry());
        let mut writer = SuperlogWriter::new(Vec::new(), codec);

        writer
            .append(&SwitchFailure::new(&registry, Dpid::new(1)).into())
            .unwrap();
        writer
            .append(&SwitchRecovery::new(&registry, Dpid::new(1)).into())
            .unwrap();
        assert_eq!(writer.written(), 2);

        let text = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn blank_lines_are_skipped() {
        let text = concat!(
            r#"{"class":"SwitchFailure","label":"e1","time":[1,0],"dpid":1}"#,
            "\n\n   \n",
            r#"{"class":"SwitchRecovery","label":"e2","time":[2,0],"dpid":1}"#,
            "\n",
        );
        let events = parse_superlog(text.as_bytes(), &codec()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].class(), "SwitchRecovery");
    }

    #[test]
    fn decode_errors_carry_the_line_number() {
        let text = concat!(
            r#"{"class":"SwitchFailure","label":"e1","time":[1,0],"dpid":1}"#,
            "\n\n",
            r#"{"class":"LinkFailure","label":"e2","time":[1,0],"start_dpid":8,"start_port_no":3,"end_dpid":15}"#,
            "\n",
        );
        let err = parse_superlog(text.as_bytes(), &codec()).unwrap_err();
        assert_eq!(err.line(), Some(3));
        assert!(matches!(
            err,
            SuperlogError::Decode {
                source: CodecError::MissingField {
                    field: "end_port_no",
                    ..
                },
                ..
            }
        ));
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let err = read_superlog(dir.path().join("absent.log"), &codec()).unwrap_err();
        assert!(matches!(err, SuperlogError::Open { .. }));
    }
}
