//! Bucket and object fixtures.
//!
//! Two independent sets are tracked:
//!
//! - **prepared**: generated here and created on the target by the setup
//!   phase.  The harness owns these and removes them at the end of a run.
//! - **unprepared**: described by a JSON manifest and assumed to already
//!   exist on the target.  Only read by the harness.
//!
//! A set's objects all live in its first bucket.  Every object carries its
//! full body so responses can be checked byte for byte.  Nothing in this
//! module talks to the network.

use std::path::{Path, PathBuf};

use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use rand::Rng;
use serde::Deserialize;

use crate::errors::HarnessError;

/// Prefix for every bucket and object the harness creates.
pub const NAME_PREFIX: &str = "s3verify-";

/// Length of generated bucket names (S3 allows 3-63).
pub const BUCKET_NAME_LEN: usize = 60;

const NAME_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// A bucket referenced by the harness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketInfo {
    pub name: String,
    /// When the harness created it; `None` for pre-existing buckets.
    pub created: Option<DateTime<Utc>>,
}

impl BucketInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created: None,
        }
    }
}

/// An object and the bytes it must contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub body: Bytes,
}

impl ObjectInfo {
    pub fn new(key: impl Into<String>, body: Bytes) -> Self {
        Self {
            key: key.into(),
            size: body.len() as u64,
            body,
        }
    }

    /// Hex MD5 of the body, which S3 reports as a single-part ETag.
    pub fn md5_hex(&self) -> String {
        hex::encode(Md5::digest(&self.body))
    }
}

/// Buckets plus the objects stored in the first of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixtureSet {
    pub buckets: Vec<BucketInfo>,
    pub objects: Vec<ObjectInfo>,
}

impl FixtureSet {
    /// Generate `bucket_count` random bucket names and `object_count`
    /// objects of `object_size` random bytes.
    pub fn generate<R: Rng + ?Sized>(
        rng: &mut R,
        bucket_count: usize,
        object_count: usize,
        object_size: usize,
    ) -> Self {
        let buckets = (0..bucket_count)
            .map(|_| BucketInfo::new(random_bucket_name(rng, NAME_PREFIX)))
            .collect();
        let objects = (0..object_count)
            .map(|i| {
                let mut body = vec![0u8; object_size];
                rng.fill(body.as_mut_slice());
                ObjectInfo::new(format!("{NAME_PREFIX}object-{i}"), Bytes::from(body))
            })
            .collect();
        Self { buckets, objects }
    }

    /// The bucket holding this set's objects.
    pub fn object_bucket(&self) -> Option<&BucketInfo> {
        self.buckets.first()
    }

    /// Check that the set is usable as an oracle.
    pub fn validate(&self) -> Result<(), HarnessError> {
        if !self.objects.is_empty() && self.buckets.is_empty() {
            return Err(HarnessError::Fixture(
                "objects are listed but no bucket holds them".to_string(),
            ));
        }
        for (i, object) in self.objects.iter().enumerate() {
            if object.size != object.body.len() as u64 {
                return Err(HarnessError::Fixture(format!(
                    "object {} declares {} bytes but has {}",
                    object.key,
                    object.size,
                    object.body.len()
                )));
            }
            if self.objects[..i].iter().any(|o| o.key == object.key) {
                return Err(HarnessError::Fixture(format!(
                    "object {} is listed twice",
                    object.key
                )));
            }
        }
        Ok(())
    }

    /// Load a set from a JSON manifest.
    ///
    /// ```json
    /// {
    ///   "buckets": ["existing-bucket"],
    ///   "objects": [
    ///     { "key": "obj1", "body_base64": "aGVsbG8=" },
    ///     { "key": "obj2", "size": 100, "body_file": "obj2.bin" }
    ///   ]
    /// }
    /// ```
    ///
    /// Relative `body_file` paths are resolved against the manifest's
    /// directory.
    pub fn from_manifest<P: AsRef<Path>>(path: P) -> Result<Self, HarnessError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::Fixture(format!("cannot read manifest {}: {e}", path.display()))
        })?;
        let manifest: Manifest = serde_json::from_str(&contents).map_err(|e| {
            HarnessError::Fixture(format!("invalid manifest {}: {e}", path.display()))
        })?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        manifest.into_fixture_set(&base_dir)
    }
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    buckets: Vec<String>,
    #[serde(default)]
    objects: Vec<ManifestObject>,
}

#[derive(Debug, Deserialize)]
struct ManifestObject {
    key: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    body_base64: Option<String>,
    #[serde(default)]
    body_file: Option<PathBuf>,
}

impl Manifest {
    fn into_fixture_set(self, base_dir: &Path) -> Result<FixtureSet, HarnessError> {
        let buckets = self.buckets.into_iter().map(BucketInfo::new).collect();
        let objects = self
            .objects
            .into_iter()
            .map(|object| object.into_object_info(base_dir))
            .collect::<Result<Vec<_>, _>>()?;
        let set = FixtureSet { buckets, objects };
        set.validate()?;
        Ok(set)
    }
}

impl ManifestObject {
    fn into_object_info(self, base_dir: &Path) -> Result<ObjectInfo, HarnessError> {
        let body = match (self.body_base64, self.body_file) {
            (Some(encoded), None) => base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| {
                    HarnessError::Fixture(format!("object {}: invalid base64: {e}", self.key))
                })?,
            (None, Some(file)) => {
                let file = base_dir.join(file);
                std::fs::read(&file).map_err(|e| {
                    HarnessError::Fixture(format!(
                        "object {}: cannot read {}: {e}",
                        self.key,
                        file.display()
                    ))
                })?
            }
            _ => {
                return Err(HarnessError::Fixture(format!(
                    "object {}: exactly one of body_base64 or body_file is required",
                    self.key
                )))
            }
        };
        let body = Bytes::from(body);
        Ok(ObjectInfo {
            size: self.size.unwrap_or(body.len() as u64),
            key: self.key,
            body,
        })
    }
}

/// Which fixture set read-only cases exercise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareMode {
    /// Harness-owned fixtures created by the setup phase.
    Prepared,
    /// Pre-existing fixtures from the manifest.
    Unprepared,
}

impl PrepareMode {
    pub fn from_flag(prepare: bool) -> Self {
        if prepare {
            PrepareMode::Prepared
        } else {
            PrepareMode::Unprepared
        }
    }
}

/// Both fixture sets for a run.
#[derive(Debug, Clone, Default)]
pub struct Fixtures {
    pub prepared: FixtureSet,
    pub unprepared: FixtureSet,
}

impl Fixtures {
    pub fn new(prepared: FixtureSet, unprepared: FixtureSet) -> Self {
        Self {
            prepared,
            unprepared,
        }
    }

    /// The set read-only cases use under `mode`.
    pub fn select(&self, mode: PrepareMode) -> &FixtureSet {
        match mode {
            PrepareMode::Prepared => &self.prepared,
            PrepareMode::Unprepared => &self.unprepared,
        }
    }

    /// Record a bucket the harness just created so it gets cleaned up.
    pub fn track_created_bucket(&mut self, name: String) {
        self.prepared.buckets.push(BucketInfo {
            name,
            created: Some(Utc::now()),
        });
    }
}

/// `prefix` followed by random lowercase letters and digits, for a total
/// of [`BUCKET_NAME_LEN`] characters.
pub fn random_bucket_name<R: Rng + ?Sized>(rng: &mut R, prefix: &str) -> String {
    let mut name = String::with_capacity(BUCKET_NAME_LEN);
    name.push_str(prefix);
    while name.len() < BUCKET_NAME_LEN {
        let idx = rng.gen_range(0..NAME_CHARSET.len());
        name.push(NAME_CHARSET[idx] as char);
    }
    name
}

/// Pick an inclusive byte range `[start, end]` inside an object of `size`
/// bytes: `start` uniform in `[0, size)`, then `end` uniform in
/// `[start, size)`.  `None` when the object is empty.
pub fn select_range<R: Rng + ?Sized>(rng: &mut R, size: u64) -> Option<(u64, u64)> {
    if size == 0 {
        return None;
    }
    let start = rng.gen_range(0..size);
    let end = rng.gen_range(start..size);
    Some((start, end))
}
