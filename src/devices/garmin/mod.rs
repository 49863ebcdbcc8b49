//! Garmin Descent USB-storage backend.
//!
//! The watch mounts as a mass-storage volume (or MTP share mirrored to a
//! directory) and keeps one FIT file per activity under `Garmin/Activity`,
//! named `YYYY-MM-DD-HH-MM-SS.fit`. The 24-byte filename, terminating NUL
//! included, doubles as the dive fingerprint and is prepended to the file
//! contents handed to the dive callback, where the parser expects it.
//!
//! Enumeration is newest-first by reverse filename comparison, which for
//! these timestamped names is reverse chronological order.

pub mod fit;

use crate::device::{CancelToken, Device, DeviceBase, DiveCallback, DiveData};
use crate::error::{Error, Result};
use crate::event::{DeviceEvent, EventSink, Progress};
use crate::parser::Parser;
use fit::parser::GarminParser;
use std::path::{Path, PathBuf};

/// Fingerprint width: the activity filename with its terminating NUL.
pub const FINGERPRINT_SIZE: usize = fit::NAME_SIZE;

/// Garmin Descent device handle over a mounted storage directory.
pub struct GarminDevice {
    base: DeviceBase,
    root: PathBuf,
}

impl GarminDevice {
    /// Open a device rooted at the watch's mount point.
    pub fn open(root: impl AsRef<Path>, events: Option<EventSink>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(Error::NoDevice(format!("{} is not a directory", root.display())));
        }
        log::info!("Garmin storage at {}", root.display());
        Ok(Self { base: DeviceBase::new(events), root })
    }

    fn activity_dir(&self) -> PathBuf {
        self.root.join("Garmin").join("Activity")
    }

    /// Activity filenames, newest first.
    fn list_activities(&self) -> Result<Vec<String>> {
        let dir = self.activity_dir();
        let entries = std::fs::read_dir(&dir)
            .map_err(|e| Error::NoDevice(format!("{}: {e}", dir.display())))?;
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| {
                name.len() < FINGERPRINT_SIZE && name.to_ascii_lowercase().ends_with(".fit")
            })
            .collect();
        // Reverse string comparison; the timestamp names make this newest
        // first.
        names.sort_by(|a, b| b.cmp(a));
        Ok(names)
    }
}

impl Device for GarminDevice {
    fn set_fingerprint(&mut self, data: &[u8]) -> Result<()> {
        self.base.set_fingerprint(data, FINGERPRINT_SIZE)
    }

    fn foreach(&mut self, callback: &mut DiveCallback<'_>) -> Result<()> {
        self.base.ensure_open()?;
        self.base.emit(&DeviceEvent::Vendor(b"Garmin"));

        let names = self.list_activities()?;
        let mut progress = Progress { current: 0, maximum: names.len() as u32 };
        self.base.emit_progress(&progress);

        let mut devinfo_sent = false;
        for name in names {
            self.base.check_cancelled()?;

            let mut fingerprint = [0u8; FINGERPRINT_SIZE];
            fingerprint[..name.len()].copy_from_slice(name.as_bytes());
            if self.base.fingerprint_matches(&fingerprint) {
                log::debug!("fingerprint match at {name}, stopping");
                break;
            }

            let path = self.activity_dir().join(&name);
            let contents = std::fs::read(&path)?;
            let mut data = Vec::with_capacity(FINGERPRINT_SIZE + contents.len());
            data.extend_from_slice(&fingerprint);
            data.extend_from_slice(&contents);

            // Runs and rides land in the same directory; only hand dives to
            // the callback.
            let mut parser = GarminParser::new();
            match parser.set_data(&data) {
                Ok(()) => {}
                Err(err) => {
                    log::warn!("skipping {name}: {err}");
                    progress.current += 1;
                    self.base.emit_progress(&progress);
                    continue;
                }
            }
            if !parser.is_dive() {
                log::debug!("skipping {name}: not a dive");
                progress.current += 1;
                self.base.emit_progress(&progress);
                continue;
            }
            if !devinfo_sent {
                let (model, firmware, serial) = parser.device_info();
                self.base.emit(&DeviceEvent::DevInfo { model, firmware, serial });
                devinfo_sent = true;
            }
            drop(parser);

            let keep_going = callback(DiveData { data: &data, fingerprint: &fingerprint });
            progress.current += 1;
            self.base.emit_progress(&progress);
            if !keep_going {
                break;
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.base.mark_closed()
    }

    fn cancel_token(&self) -> CancelToken {
        self.base.cancel_token()
    }
}
