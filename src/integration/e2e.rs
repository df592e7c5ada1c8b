//! End-to-end integration tests
//!
//! Each test builds an input tree of synthetic studies in a scratch
//! directory, runs discovery, the worker pool and the ledger writer exactly
//! as the binary does, and inspects the media tree and ledger afterwards.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use crate::config::{test_config, Config, LedgerMode};
use crate::config_file::ConfigFile;
use crate::discovery::discover_files;
use crate::error::{ConfigError, ExportError};
use crate::integration::fixtures::{write_junk, StudyFixture};
use crate::ledger::LedgerWriter;
use crate::scheduler::{self, RunSummary};
use crate::study::StudyFile;
use crate::transform::MediaTransformer;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("dicom")).unwrap();
        Self { dir }
    }

    fn input(&self, relative: &str) -> PathBuf {
        self.dir.path().join("dicom").join(relative)
    }

    fn media(&self, relative: &str) -> PathBuf {
        self.dir.path().join("media").join(relative)
    }

    fn ledger(&self) -> PathBuf {
        self.dir.path().join("metadata.jsonl")
    }

    fn config(&self) -> Config {
        test_config(
            self.dir.path().join("dicom"),
            self.dir.path().join("media"),
            self.ledger(),
        )
    }

    fn records(&self) -> Vec<serde_json::Value> {
        match std::fs::read_to_string(self.ledger()) {
            Ok(content) => content
                .lines()
                .map(|l| serde_json::from_str(l).expect("complete JSON object per line"))
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// Run discovery, the pool and the ledger writer the way `main` does.
async fn export(config: &Config) -> RunSummary {
    let ledger = LedgerWriter::open(&config.metadata.file, config.metadata.mode).unwrap();
    let files = discover_files(&config.input.dir, config.input.recursive);
    let transformer = Arc::new(MediaTransformer::new(config, ledger.handle().unwrap()));

    let summary = scheduler::run(files, transformer, config.num_workers).await;
    let recorded = ledger.finish().unwrap();
    assert_eq!(recorded as usize, summary.recorded());
    summary
}

fn video_encoder_available(config: &Config) -> bool {
    crate::ffmpeg::init().unwrap();
    crate::ffmpeg::video_encoder(&config.video.encoder.codec).is_some()
}

fn mtime(path: &Path) -> std::time::SystemTime {
    std::fs::metadata(path).unwrap().modified().unwrap()
}

#[tokio::test]
async fn test_still_and_cine_study() {
    let ws = Workspace::new();
    let config = ws.config();
    if !video_encoder_available(&config) {
        return;
    }

    StudyFixture::rgb_still(6, 8).write(&ws.input("a/still.dcm"));
    StudyFixture::grayscale_cine(10, 16, 16).write(&ws.input("b/cine.dcm"));

    let summary = export(&config).await;
    assert_eq!(summary.written, 2, "failures: {:?}", summary.failures);
    assert_eq!(summary.failed, 0);

    assert!(ws.media("a/still.png").is_file());
    assert!(ws.media("b/cine.avi").is_file());

    let records = ws.records();
    assert_eq!(records.len(), 2);

    let image = records
        .iter()
        .find(|r| r["media_type"] == "image")
        .expect("image record");
    assert_eq!(image["dicom_file"], "a/still.dcm");
    assert_eq!(image["media_file"], "a/still.png");
    assert_eq!(image["Patient ID"], "PAT001");

    let video = records
        .iter()
        .find(|r| r["media_type"] == "video")
        .expect("video record");
    assert_eq!(video["dicom_file"], "b/cine.dcm");
    assert_eq!(video["media_file"], "b/cine.avi");
    assert_eq!(video["Number of Frames"], "10");
}

#[test]
fn test_grayscale_cine_becomes_rgb() {
    let ws = Workspace::new();
    let path = ws.input("cine.dcm");
    StudyFixture::grayscale_cine(10, 16, 16).write(&path);

    let study = StudyFile::open(&path).unwrap();
    let frames = study
        .decode_pixels()
        .unwrap()
        .into_video(study.samples_per_pixel().unwrap())
        .unwrap();

    assert_eq!(frames.frame_count(), 10);
    assert_eq!(frames.height(), 16);
    assert_eq!(frames.width(), 16);
    assert_eq!(frames.channels(), 3);

    let first = frames.frame(0);
    assert_eq!(first[[0, 1, 0]], first[[0, 1, 2]]);
}

#[test]
fn test_sixteen_bit_samples_rescaled() {
    let ws = Workspace::new();
    let path = ws.input("cine16.dcm");
    StudyFixture::grayscale_cine(4, 16, 16)
        .with_bits(16)
        .write(&path);

    let study = StudyFile::open(&path).unwrap();
    let frames = study.decode_pixels().unwrap().into_video(1).unwrap();

    let mut min = u8::MAX;
    let mut max = u8::MIN;
    for index in 0..frames.frame_count() {
        for &v in frames.frame(index).iter() {
            min = min.min(v);
            max = max.max(v);
        }
    }
    assert!(min <= 1, "darkest sample {}", min);
    assert!(max >= 254, "brightest sample {}", max);
}

fn assert_red(pixel: [u8; 3]) {
    let [r, g, b] = pixel;
    assert!(r > 230 && g < 30 && b < 30, "expected red, got {:?}", pixel);
}

#[test]
fn test_compressed_ybr_study_decodes_to_rgb() {
    let ws = Workspace::new();
    let path = ws.input("us.dcm");
    StudyFixture::jpeg_still(16, 16, [255, 0, 0]).write(&path);

    let study = StudyFile::open(&path).unwrap();
    let image = study.decode_pixels().unwrap().into_image().unwrap();
    assert_eq!((image.height(), image.width()), (16, 16));

    let bytes = image.to_bytes();
    let centre = (8 * 16 + 8) * 3;
    assert_red([bytes[centre], bytes[centre + 1], bytes[centre + 2]]);
}

#[tokio::test]
async fn test_compressed_ybr_study_exported_in_colour() {
    let ws = Workspace::new();
    StudyFixture::jpeg_still(16, 16, [255, 0, 0]).write(&ws.input("us.dcm"));

    let summary = export(&ws.config()).await;
    assert_eq!(summary.written, 1, "failures: {:?}", summary.failures);

    let png = image::open(ws.media("us.png")).unwrap().to_rgb8();
    assert_red(png.get_pixel(8, 8).0);

    let records = ws.records();
    assert_eq!(records[0]["Photometric Interpretation"], "YBR_FULL_422");
}

#[test]
fn test_recommended_frame_rate() {
    let ws = Workspace::new();
    let path = ws.input("cine.dcm");
    StudyFixture::grayscale_cine(3, 4, 4)
        .with_frame_rate("12")
        .write(&path);

    let study = StudyFile::open(&path).unwrap();
    assert_eq!(study.frame_rate(30), 12);
}

#[test]
fn test_frame_rate_capped() {
    let ws = Workspace::new();
    let fast = ws.input("fast.dcm");
    StudyFixture::grayscale_cine(3, 4, 4)
        .with_frame_rate("100000")
        .write(&fast);
    let still = ws.input("still.dcm");
    StudyFixture::grayscale_cine(3, 4, 4)
        .with_frame_rate("0")
        .with_instance(2)
        .write(&still);

    assert_eq!(
        StudyFile::open(&fast).unwrap().frame_rate(30),
        crate::config::MAX_FRAME_RATE
    );
    assert_eq!(StudyFile::open(&still).unwrap().frame_rate(30), 30);
}

#[tokio::test]
async fn test_rerun_does_not_rewrite_media() {
    let ws = Workspace::new();
    let mut config = ws.config();
    if !video_encoder_available(&config) {
        return;
    }

    StudyFixture::rgb_still(6, 8).write(&ws.input("still.dcm"));
    StudyFixture::grayscale_cine(10, 16, 16).write(&ws.input("cine.dcm"));

    let first = export(&config).await;
    assert_eq!(first.written, 2);

    let still = ws.media("still.png");
    let cine = ws.media("cine.avi");
    let before = (
        std::fs::read(&still).unwrap(),
        std::fs::read(&cine).unwrap(),
        mtime(&still),
        mtime(&cine),
    );

    config.metadata.mode = LedgerMode::Append;
    let second = export(&config).await;
    assert_eq!(second.written, 0);
    assert_eq!(second.skipped, 2);

    let after = (
        std::fs::read(&still).unwrap(),
        std::fs::read(&cine).unwrap(),
        mtime(&still),
        mtime(&cine),
    );
    assert_eq!(before, after);

    let records = ws.records();
    assert_eq!(records.len(), 4);
    assert_eq!(
        records.iter().filter(|r| r["media_file"] == "cine.avi").count(),
        2
    );
}

#[tokio::test]
async fn test_unreadable_and_invalid_files_not_recorded() {
    let ws = Workspace::new();
    let config = ws.config();

    write_junk(&ws.input("notes.txt"));
    StudyFixture::grayscale_still(8, 8).write(&ws.input("gray.dcm"));
    StudyFixture::rgb_still(6, 8).write(&ws.input("ok.dcm"));

    let summary = export(&config).await;
    assert_eq!(summary.unreadable, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.written, 1);
    assert_eq!(summary.failures[0].0, ws.input("gray.dcm"));

    assert!(!ws.media("notes.png").exists());
    assert!(!ws.media("notes.avi").exists());
    assert!(!ws.media("gray.png").exists());
    assert!(ws.media("ok.png").is_file());

    let records = ws.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["dicom_file"], "ok.dcm");
}

#[tokio::test]
async fn test_parallel_workers_share_ledger() {
    let ws = Workspace::new();
    let mut config = ws.config();
    config.num_workers = 4;

    for i in 0..12 {
        StudyFixture::rgb_still(6, 8)
            .with_instance(i)
            .write(&ws.input(&format!("series/{:02}.dcm", i)));
    }

    let summary = export(&config).await;
    assert_eq!(summary.written, 12, "failures: {:?}", summary.failures);

    let records = ws.records();
    assert_eq!(records.len(), 12);
    let mut sources: Vec<_> = records
        .iter()
        .map(|r| r["dicom_file"].as_str().unwrap().to_string())
        .collect();
    sources.sort();
    sources.dedup();
    assert_eq!(sources.len(), 12);
    assert!(ws.media("series/00.png").is_file());
    assert!(ws.media("series/11.png").is_file());
}

#[tokio::test]
async fn test_non_recursive_scan() {
    let ws = Workspace::new();
    let mut config = ws.config();
    config.input.recursive = false;

    StudyFixture::rgb_still(6, 8).write(&ws.input("top.dcm"));
    StudyFixture::rgb_still(6, 8).write(&ws.input("nested/deep.dcm"));

    let summary = export(&config).await;
    assert_eq!(summary.total(), 1);
    assert!(ws.media("top.png").is_file());
    assert!(!ws.media("nested/deep.png").exists());
}

#[test]
fn test_existing_ledger_refused() {
    let ws = Workspace::new();
    let config = ws.config();
    std::fs::write(ws.ledger(), b"{}\n").unwrap();

    assert!(LedgerWriter::open(&config.metadata.file, config.metadata.mode).is_err());
    assert_eq!(std::fs::read(ws.ledger()).unwrap(), b"{}\n");
}

fn write_run_config(ws: &Workspace, copy: &Path) -> PathBuf {
    let path = ws.dir.path().join("run.toml");
    let content = format!(
        "[dicom]\ndir = {:?}\n\n[media]\ndir = {:?}\n\n\
         [metadata]\nfile = {:?}\n\n[config]\nfile = {:?}\n",
        ws.input(""),
        ws.media(""),
        ws.ledger(),
        copy
    );
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_refused_start_keeps_previous_run() {
    let ws = Workspace::new();
    StudyFixture::rgb_still(6, 8).write(&ws.input("still.dcm"));
    let copy = ws.dir.path().join("copy.toml");
    let file = ConfigFile::from_file(write_run_config(&ws, &copy)).unwrap();

    std::fs::write(ws.ledger(), b"{}\n").unwrap();
    std::fs::write(&copy, b"# previous run\n").unwrap();

    let config = file.clone().into_config(false);
    config.validate().unwrap();
    assert!(matches!(
        crate::open_ledger(&file, &config),
        Err(ExportError::Config(ConfigError::LedgerExists(_)))
    ));

    assert_eq!(std::fs::read(&copy).unwrap(), b"# previous run\n");
    assert_eq!(std::fs::read(ws.ledger()).unwrap(), b"{}\n");
    assert!(!ws.media("").exists());

    // --overwrite replaces both
    let config = file.clone().into_config(true);
    let ledger = crate::open_ledger(&file, &config).unwrap();
    assert_eq!(ledger.finish().unwrap(), 0);
    let saved = ConfigFile::from_file(&copy).unwrap();
    assert_eq!(saved.metadata.file, ws.ledger());
    assert!(std::fs::read(ws.ledger()).unwrap().is_empty());
}
