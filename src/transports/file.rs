use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use uuid::Uuid;

use crate::{sentry_debug, Envelope, Transport};

/// A [`Transport`] that writes each envelope to a uniquely named file in a
/// directory instead of sending it over the network.
///
/// This is the single offline sink: a relay can later pick the files up and
/// forward them.
pub struct FileSinkTransport {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FileSinkTransport {
    /// Creates a new file sink writing into `dir`.
    ///
    /// The directory is created if it does not exist.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if let Err(err) = fs::create_dir_all(&dir) {
            sentry_debug!("failed to create envelope sink dir: {}", err);
        }
        Self {
            dir,
            lock: Mutex::new(()),
        }
    }

    /// The directory envelopes are written to.
    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }
}

impl Transport for FileSinkTransport {
    fn send_envelope(&self, envelope: Envelope) {
        let _guard = self.lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let name = format!("{}.envelope", Uuid::new_v4().as_simple());
        let path = self.dir.join(name);
        let write = fs::File::create(&path)
            .and_then(|mut file| {
                envelope.to_writer(&mut file)?;
                file.flush()
            });
        if let Err(err) = write {
            sentry_debug!("failed to write envelope to {}: {}", path.display(), err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_one_file_per_envelope() {
        let dir = std::env::temp_dir().join(format!("envelope-sink-{}", Uuid::new_v4()));
        let transport = FileSinkTransport::new(&dir);

        for _ in 0..3 {
            let mut envelope = Envelope::new();
            envelope.add_item(crate::protocol::Event::default());
            transport.send_envelope(envelope);
        }

        let files: Vec<_> = fs::read_dir(&dir).unwrap().collect();
        assert_eq!(files.len(), 3);
        for file in files {
            let contents = fs::read_to_string(file.unwrap().path()).unwrap();
            assert!(contents.contains(r#"{"type":"event","length":"#));
        }
        fs::remove_dir_all(&dir).ok();
    }
}
