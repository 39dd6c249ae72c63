//! Test doubles: a colour-keyed face encoder and an in-memory metadata store.

use crate::metadata::{MetadataError, MetadataTool, TagUpdate};
use image::{Rgb, RgbImage};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tagger_core::{EncoderError, Encoding, FaceEncoder};

pub const RED: [u8; 3] = [255, 0, 0];
pub const GREEN: [u8; 3] = [0, 255, 0];
pub const BLUE: [u8; 3] = [0, 0, 255];
/// A "face" that makes [`StubEncoder`] panic.
pub const POISON: [u8; 3] = [255, 255, 0];

const ROW_WIDTH: u32 = 16;

/// Write a PNG whose first row holds one non-black pixel per face.
pub fn write_faces(path: &Path, faces: &[[u8; 3]]) {
    write_faces_padded(path, faces, 0);
}

/// Like [`write_faces`], with `rows` extra rows of gradient filler that the
/// stub encoder ignores but that change the file size.
pub fn write_faces_padded(path: &Path, faces: &[[u8; 3]], rows: u32) {
    let mut img = RgbImage::from_fn(ROW_WIDTH, 1 + rows, |x, y| {
        let v = ((x * 7 + y * 13) % 251) as u8;
        Rgb([v, v.wrapping_mul(3), v.wrapping_add(90)])
    });
    for x in 0..ROW_WIDTH {
        img.put_pixel(x, 0, Rgb([0, 0, 0]));
    }
    for (x, face) in faces.iter().enumerate() {
        img.put_pixel(x as u32, 0, Rgb(*face));
    }
    img.save(path).unwrap();
}

/// Treats every non-black pixel of the first row as a face whose encoding is
/// its colour.
#[derive(Default, Clone)]
pub struct StubEncoder {
    calls: Arc<AtomicUsize>,
}

impl StubEncoder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn encoding_of(color: [u8; 3]) -> Encoding {
        Encoding::new(color.iter().map(|&c| c as f32 / 255.0).collect())
    }
}

impl FaceEncoder for StubEncoder {
    fn encode(&mut self, frame: &RgbImage) -> Result<Vec<Encoding>, EncoderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let faces: Vec<[u8; 3]> = (0..frame.width())
            .map(|x| frame.get_pixel(x, 0).0)
            .filter(|p| *p != [0, 0, 0])
            .collect();
        if faces.contains(&POISON) {
            panic!("stub encoder hit a poisoned frame");
        }
        Ok(faces.into_iter().map(Self::encoding_of).collect())
    }

    fn model_version(&self) -> &str {
        "stub-v1"
    }
}

/// Metadata tool that keeps tags in memory and counts invocations.
#[derive(Default)]
pub struct MemoryMetadata {
    tags: Mutex<HashMap<PathBuf, BTreeSet<String>>>,
    appended: Mutex<Vec<(PathBuf, Vec<TagUpdate>)>>,
    reads: AtomicUsize,
    failing: Mutex<BTreeSet<PathBuf>>,
}

impl MemoryMetadata {
    pub fn with_tags(path: &Path, tags: &[&str]) -> Self {
        let tool = Self::default();
        tool.tags
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), tags.iter().map(|t| t.to_string()).collect());
        tool
    }

    pub fn fail_writes_for(&self, path: &Path) {
        self.failing.lock().unwrap().insert(path.to_path_buf());
    }

    pub fn tags(&self, path: &Path) -> BTreeSet<String> {
        self.tags.lock().unwrap().get(path).cloned().unwrap_or_default()
    }

    pub fn writes(&self) -> usize {
        self.appended.lock().unwrap().len()
    }

    pub fn appended(&self) -> Vec<(PathBuf, Vec<TagUpdate>)> {
        self.appended.lock().unwrap().clone()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn invocations(&self) -> usize {
        self.reads() + self.writes()
    }
}

impl MetadataTool for MemoryMetadata {
    fn read_tags(&self, path: &Path) -> Result<BTreeSet<String>, MetadataError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.tags(path))
    }

    fn append_tags(&self, path: &Path, updates: &[TagUpdate]) -> Result<(), MetadataError> {
        if self.failing.lock().unwrap().contains(path) {
            return Err(MetadataError::ToolFailed {
                program: "memory".into(),
                status: "exit status: 1".into(),
                stderr: "simulated failure".into(),
            });
        }
        self.appended.lock().unwrap().push((path.to_path_buf(), updates.to_vec()));
        let mut tags = self.tags.lock().unwrap();
        let entry = tags.entry(path.to_path_buf()).or_default();
        entry.extend(updates.iter().map(|u| u.value.clone()));
        Ok(())
    }
}
