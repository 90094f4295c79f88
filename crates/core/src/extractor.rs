use crate::error::ReconcileError;
use crate::metadata;
use crate::models::TagMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, warn};

/// Produces the flat tag map for one local file.
pub trait MetadataSource: Send + Sync {
    fn read_tags(&self, path: &Path) -> Result<TagMap, ReconcileError>;
}

/// exiftool when it can be run, otherwise the built-in EXIF reader, which
/// cannot read movie containers.
pub fn detect(program: Option<&str>) -> Arc<dyn MetadataSource> {
    let exiftool = ExiftoolSource::new(program.unwrap_or(ExiftoolSource::DEFAULT_PROGRAM));
    match exiftool.version() {
        Some(version) => {
            debug!("Using exiftool {} at {}", version, exiftool.program.display());
            Arc::new(exiftool)
        }
        None => {
            warn!(
                "exiftool not found at {}; movie files will be skipped",
                exiftool.program.display()
            );
            Arc::new(ExifSource)
        }
    }
}

/// Runs `exiftool -j -G`, which names every tag `<Group>:<Tag>`.
#[derive(Debug, Clone)]
pub struct ExiftoolSource {
    program: PathBuf,
}

impl ExiftoolSource {
    pub const DEFAULT_PROGRAM: &'static str = "exiftool";

    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// `None` when the program cannot be run.
    pub fn version(&self) -> Option<String> {
        let output = Command::new(&self.program).arg("-ver").output().ok()?;
        if !output.status.success() {
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl MetadataSource for ExiftoolSource {
    fn read_tags(&self, path: &Path) -> Result<TagMap, ReconcileError> {
        let output = Command::new(&self.program)
            .args(["-j", "-G"])
            .args(metadata::recognized_tags().map(|t| format!("-{}", t)))
            .arg(path)
            .output()
            .map_err(|e| ReconcileError::metadata(path, format!("failed to run exiftool: {}", e)))?;
        // exiftool exits 1 on unreadable files but still prints the JSON error record.
        if output.stdout.is_empty() {
            return Err(ReconcileError::metadata(
                path,
                format!(
                    "exiftool failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }
        parse_exiftool_json(path, &output.stdout)
    }
}

/// Flattens the first record of exiftool's JSON array into a tag map.
pub fn parse_exiftool_json(path: &Path, json: &[u8]) -> Result<TagMap, ReconcileError> {
    let records: Vec<serde_json::Map<String, serde_json::Value>> = serde_json::from_slice(json)
        .map_err(|e| ReconcileError::metadata(path, format!("bad exiftool output: {}", e)))?;
    let record = records
        .into_iter()
        .next()
        .ok_or_else(|| ReconcileError::metadata(path, "exiftool returned no record"))?;
    if let Some(err) = record.get("ExifTool:Error").and_then(|v| v.as_str()) {
        return Err(ReconcileError::metadata(path, format!("exiftool: {}", err)));
    }

    let mut map = TagMap::new();
    for (key, value) in record {
        if key == "SourceFile" {
            continue;
        }
        let value = match value {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            _ => continue,
        };
        map.insert(key, value);
    }
    Ok(map)
}

/// Reads EXIF fields of the primary image into `EXIF:<TagName>` keys.
/// Panasonic RW2 raws are read as the TIFF files they almost are.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExifSource;

impl MetadataSource for ExifSource {
    fn read_tags(&self, path: &Path) -> Result<TagMap, ReconcileError> {
        extract_exif(path)
    }
}

#[cfg(feature = "exif")]
const RW2_MAGIC: &[u8] = b"IIU\0";

#[cfg(feature = "exif")]
fn extract_exif(path: &Path) -> Result<TagMap, ReconcileError> {
    use std::io::{BufReader, Read, Seek, SeekFrom};

    let file = std::fs::File::open(path)
        .map_err(|e| ReconcileError::metadata(path, format!("open failed: {}", e)))?;
    let mut bufreader = BufReader::new(file);
    let mut magic = [0u8; 4];
    let is_rw2 = bufreader.read_exact(&mut magic).is_ok() && magic == RW2_MAGIC;
    bufreader
        .seek(SeekFrom::Start(0))
        .map_err(|e| ReconcileError::metadata(path, format!("seek failed: {}", e)))?;

    let parsed = if is_rw2 {
        let mut data = Vec::new();
        bufreader
            .read_to_end(&mut data)
            .map_err(|e| ReconcileError::metadata(path, format!("read failed: {}", e)))?;
        // RW2 is little-endian TIFF with 0x55 in place of the 42 marker.
        data[2] = 0x2A;
        exif::Reader::new().read_raw(data)
    } else {
        exif::Reader::new().read_from_container(&mut bufreader)
    };
    let exif =
        parsed.map_err(|e| ReconcileError::metadata(path, format!("no readable EXIF: {}", e)))?;

    let mut map = TagMap::new();
    for f in exif.fields().filter(|f| f.ifd_num == exif::In::PRIMARY) {
        let value = match &f.value {
            exif::Value::Ascii(parts) => parts
                .first()
                .map(|p| {
                    String::from_utf8_lossy(p)
                        .trim_end_matches('\0')
                        .trim()
                        .to_string()
                })
                .unwrap_or_default(),
            _ => f.display_value().to_string(),
        };
        map.insert(format!("EXIF:{}", f.tag), value);
    }
    Ok(map)
}

#[cfg(not(feature = "exif"))]
fn extract_exif(path: &Path) -> Result<TagMap, ReconcileError> {
    Err(ReconcileError::metadata(path, "built without EXIF support"))
}

/// Tag maps held in memory, keyed by path.
#[derive(Debug, Default, Clone)]
pub struct StaticSource {
    files: HashMap<PathBuf, TagMap>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file<I, K, V>(mut self, path: impl Into<PathBuf>, tags: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.files.insert(
            path.into(),
            tags.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        );
        self
    }

    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.files.keys()
    }
}

impl MetadataSource for StaticSource {
    fn read_tags(&self, path: &Path) -> Result<TagMap, ReconcileError> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| ReconcileError::metadata(path, "no metadata found"))
    }
}
