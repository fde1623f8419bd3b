use std::{fs::File, io, path::Path, thread};

use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;

use plugin_api::signal::Signal;

use crate::consumer::Consumer;

/// This marks the currently understood version of the recording format. This
/// should be increased whenever the format has a breaking change that we
/// cannot parse.
const DATA_FORMAT_VERSION: u8 = 1;

/// A [`Consumer`] that appends every signal to a file as newline-delimited
/// JSON, on a dedicated IO thread.
pub struct Recorder {
    tx: Sender<Signal>,
    _worker: thread::JoinHandle<()>,
}

#[derive(Serialize)]
struct Header {
    v: u8,
    started_at: String,
}

impl Recorder {
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        let (tx, rx) = crossbeam_channel::bounded(4096);
        let _worker = thread::Builder::new()
            .name("plugin-telemetry/recorder/io".into())
            .spawn(move || {
                if let Err(e) = record_io(file, rx) {
                    eprintln!("signal recorder failed: {e}");
                }
            })?;

        Ok(Recorder { tx, _worker })
    }
}

impl Consumer for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn consume(&self, signal: Signal) {
        if self.tx.send(signal).is_err() {
            eprintln!("signal recorder thread has terminated!");
        }
    }

    fn is_processing(&self) -> bool {
        !self.tx.is_empty()
    }
}

fn record_io(file: File, rx: Receiver<Signal>) -> io::Result<()> {
    use std::io::{BufWriter, Write};

    fn write<T: Serialize>(file: &mut BufWriter<File>, val: &T) -> io::Result<()> {
        serde_json::to_writer(&mut *file, val)?;
        file.write_all(b"\n")
    }

    let mut file = BufWriter::new(file);
    write(
        &mut file,
        &Header {
            v: DATA_FORMAT_VERSION,
            started_at: humantime::format_rfc3339(std::time::SystemTime::now()).to_string(),
        },
    )?;

    // wait to receive a signal...
    while let Ok(signal) = rx.recv() {
        write(&mut file, &signal)?;

        // drain any additional signals that are ready now
        while let Ok(signal) = rx.try_recv() {
            write(&mut file, &signal)?;
        }

        file.flush()?;
    }

    tracing::debug!("signal stream ended; flushing file");
    file.flush()
}
