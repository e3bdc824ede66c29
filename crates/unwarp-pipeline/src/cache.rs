//! Persisted registration transforms keyed by a content fingerprint.
//!
//! Registration dominates the pipeline cost, so its result is cached: the
//! physical rigid parameters are written as JSON under a SHA-256 key over
//! both volumes and the registration settings. Any change to the inputs or
//! the settings changes the key, so stale entries are never returned. Cache
//! trouble is never fatal; a failed load or store logs a warning and the
//! transform is recomputed.

use crate::config::RegistrationSettings;
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use unwarp_core::transform::RigidTransform;
use unwarp_core::Volume;

/// The persisted form of a rigid registration result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedRigidTransform {
    /// Physical parameters `[rx, ry, rz, tx, ty, tz]`.
    pub parameters: [f64; 6],
    /// Center of rotation.
    pub center: [f64; 3],
}

/// File-backed transform cache.
pub struct TransformCache {
    dir: PathBuf,
}

impl TransformCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Fingerprint of a registration problem: both volumes (data and
    /// geometry) and every setting that influences the result.
    pub fn fingerprint<B: Backend>(
        fixed: &Volume<B>,
        moving: &Volume<B>,
        settings: &RegistrationSettings,
    ) -> String {
        let mut hasher = Sha256::new();
        hash_volume(&mut hasher, fixed);
        hash_volume(&mut hasher, moving);

        hasher.update((settings.num_bins as u64).to_le_bytes());
        hasher.update(settings.sampling_fraction.to_le_bytes());
        hasher.update(settings.seed.to_le_bytes());
        let schedule = &settings.schedule;
        for &factor in &schedule.shrink_factors {
            hasher.update((factor as u64).to_le_bytes());
        }
        for &sigma in &schedule.smoothing_sigmas {
            hasher.update(sigma.to_le_bytes());
        }
        for &iterations in &schedule.iterations {
            hasher.update((iterations as u64).to_le_bytes());
        }
        for &learning_rate in &schedule.learning_rates {
            hasher.update(learning_rate.to_le_bytes());
        }
        hasher.update(schedule.convergence_tolerance.to_le_bytes());
        hasher.update((schedule.convergence_window as u64).to_le_bytes());

        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Load a cached transform, or `None` on a miss or an unreadable entry.
    pub fn load<B: Backend>(&self, key: &str, device: &B::Device) -> Option<RigidTransform<B>> {
        let path = self.entry_path(key);
        let text = fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<CachedRigidTransform>(&text) {
            Ok(cached) => Some(RigidTransform::from_physical_parameters(
                cached.parameters,
                cached.center,
                device,
            )),
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "discarding unreadable cache entry");
                None
            }
        }
    }

    /// Persist a transform under `key`. Failures are logged, not returned.
    pub fn store<B: Backend>(&self, key: &str, transform: &RigidTransform<B>) {
        let cached = CachedRigidTransform {
            parameters: transform.physical_parameters(),
            center: transform.center_array(),
        };
        let path = self.entry_path(key);
        let result = fs::create_dir_all(&self.dir)
            .map_err(|e| e.to_string())
            .and_then(|_| serde_json::to_string_pretty(&cached).map_err(|e| e.to_string()))
            .and_then(|json| fs::write(&path, json).map_err(|e| e.to_string()));
        if let Err(error) = result {
            tracing::warn!(path = %path.display(), error, "failed to persist transform");
        }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Directory holding the cache entries.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn hash_volume<B: Backend>(hasher: &mut Sha256, volume: &Volume<B>) {
    for &dim in &volume.shape() {
        hasher.update((dim as u64).to_le_bytes());
    }
    let values: Vec<f32> = volume
        .data()
        .clone()
        .into_data()
        .to_vec()
        .expect("volume data is f32");
    for value in values {
        hasher.update(value.to_le_bytes());
    }
    for i in 0..3 {
        hasher.update(volume.origin()[i].to_le_bytes());
        hasher.update(volume.spacing()[i].to_le_bytes());
    }
    for r in 0..3 {
        for c in 0..3 {
            hasher.update(volume.direction()[(r, c)].to_le_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::{Shape, Tensor, TensorData};
    use burn_ndarray::NdArray;
    use tempfile::tempdir;
    use unwarp_core::spatial::{Direction3, Point3, Spacing3};

    type TestBackend = NdArray<f32>;

    fn volume(values: Vec<f32>) -> Volume<TestBackend> {
        let device = Default::default();
        Volume::new(
            Tensor::from_data(TensorData::new(values, Shape::new([2, 2, 2])), &device),
            Point3::origin(),
            Spacing3::uniform(1.0),
            Direction3::identity(),
        )
        .unwrap()
    }

    #[test]
    fn test_fingerprint_changes_with_inputs_and_settings() {
        let a = volume((0..8).map(|v| v as f32).collect());
        let b = volume((0..8).map(|v| (v + 1) as f32).collect());
        let settings = RegistrationSettings::default();

        let base = TransformCache::fingerprint(&a, &b, &settings);
        assert_eq!(base, TransformCache::fingerprint(&a, &b, &settings));
        assert_ne!(base, TransformCache::fingerprint(&b, &a, &settings));

        let mut reseeded = RegistrationSettings::default();
        reseeded.seed = 7;
        assert_ne!(base, TransformCache::fingerprint(&a, &b, &reseeded));
    }

    #[test]
    fn test_store_then_load_round_trips_parameters() {
        let dir = tempdir().unwrap();
        let cache = TransformCache::new(dir.path());
        let device = Default::default();

        let transform = RigidTransform::<TestBackend>::from_physical_parameters(
            [0.1, -0.2, 0.3, 4.0, 5.0, -6.0],
            [1.0, 2.0, 3.0],
            &device,
        );
        cache.store("abc123", &transform);

        let loaded = cache.load::<TestBackend>("abc123", &device).unwrap();
        let params = loaded.physical_parameters();
        let expected = transform.physical_parameters();
        for (p, e) in params.iter().zip(expected.iter()) {
            assert!((p - e).abs() < 1e-6);
        }
        assert_eq!(loaded.center_array(), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_missing_and_corrupt_entries_miss() {
        let dir = tempdir().unwrap();
        let cache = TransformCache::new(dir.path());
        let device = Default::default();
        assert!(cache.load::<TestBackend>("missing", &device).is_none());

        fs::write(dir.path().join("bad.json"), "not json").unwrap();
        assert!(cache.load::<TestBackend>("bad", &device).is_none());
    }
}
