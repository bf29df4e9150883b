//! cgroup v2 path discovery.
//!
//! The exact directory layout depends on the node's cgroup driver
//! (systemd-slice naming vs. plain cgroupfs naming) and on the pod's QoS
//! class. Rather than guessing once, an ordered list of path templates is
//! tried in turn; the first directory that contains a readable `cpu.stat`
//! file wins, and the winning template index is cached per pod by the
//! caller so later cycles skip the search entirely.

use std::path::{Path, PathBuf};

/// QoS class of a pod, as reported by the platform. Guaranteed-QoS pods are
/// never managed (see the filter rules), but the sensor still needs the
/// class to build the right cgroup path for the other two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QosClass {
    Guaranteed,
    Burstable,
    BestEffort,
}

impl QosClass {
    fn slice_fragment(self) -> Option<&'static str> {
        match self {
            QosClass::Guaranteed => None,
            QosClass::Burstable => Some("burstable"),
            QosClass::BestEffort => Some("besteffort"),
        }
    }
}

/// Identifies a pod for the purpose of cgroup path resolution.
#[derive(Debug, Clone)]
pub struct PodCgroupId {
    /// Kubernetes pod UID, e.g. "a1b2c3d4-...".
    pub pod_uid: String,
    pub qos: QosClass,
}

/// One candidate directory template, tried in order.
type PathTemplate = fn(root: &Path, id: &PodCgroupId) -> PathBuf;

fn systemd_guaranteed(root: &Path, id: &PodCgroupId) -> PathBuf {
    root.join("kubepods.slice")
        .join(format!("kubepods-pod{}.slice", underscored(&id.pod_uid)))
}

fn systemd_qos(root: &Path, id: &PodCgroupId) -> PathBuf {
    match id.qos.slice_fragment() {
        Some(qos) => root.join("kubepods.slice").join(format!(
            "kubepods-{qos}.slice"
        )).join(format!(
            "kubepods-{qos}-pod{}.slice",
            underscored(&id.pod_uid)
        )),
        None => systemd_guaranteed(root, id),
    }
}

fn cgroupfs_guaranteed(root: &Path, id: &PodCgroupId) -> PathBuf {
    root.join("kubepods").join(format!("pod{}", id.pod_uid))
}

fn cgroupfs_qos(root: &Path, id: &PodCgroupId) -> PathBuf {
    match id.qos.slice_fragment() {
        Some(qos) => root
            .join("kubepods")
            .join(qos)
            .join(format!("pod{}", id.pod_uid)),
        None => cgroupfs_guaranteed(root, id),
    }
}

/// Ordered list of path templates tried during discovery. Index into this
/// array is the value cached per pod once a template wins.
pub const PATH_TEMPLATES: &[PathTemplate] =
    &[systemd_qos, systemd_guaranteed, cgroupfs_qos, cgroupfs_guaranteed];

fn underscored(pod_uid: &str) -> String {
    pod_uid.replace('-', "_")
}

/// Resolves a pod's cgroup v2 directory, trying each template in turn and
/// caching (via `cached_template` / the returned index) the one that works.
pub struct CgroupPathResolver {
    root: PathBuf,
}

impl CgroupPathResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Try the previously-cached template first (fast path), falling back
    /// to a full search if it no longer resolves (e.g. stale cache after a
    /// pod restart reassigned a different QoS slice — shouldn't happen but
    /// the sensor must not wedge on it).
    pub fn resolve(
        &self,
        id: &PodCgroupId,
        cached_template: Option<usize>,
    ) -> Option<(PathBuf, usize)> {
        if let Some(idx) = cached_template {
            if let Some(template) = PATH_TEMPLATES.get(idx) {
                let path = template(&self.root, id);
                if has_readable_cpu_stat(&path) {
                    return Some((path, idx));
                }
            }
        }

        PATH_TEMPLATES.iter().enumerate().find_map(|(idx, template)| {
            let path = template(&self.root, id);
            has_readable_cpu_stat(&path).then_some((path, idx))
        })
    }
}

fn has_readable_cpu_stat(dir: &Path) -> bool {
    dir.join("cpu.stat").is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_cpu_stat(dir: &Path) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join("cpu.stat"), "usage_usec 0\nthrottled_usec 0\n").unwrap();
    }

    #[test]
    fn resolves_cgroupfs_burstable_layout() {
        let tmp = std::env::temp_dir().join(format!("mbcas-test-{}", std::process::id()));
        let id = PodCgroupId {
            pod_uid: "abc-123".to_string(),
            qos: QosClass::Burstable,
        };
        let expected = tmp
            .join("kubepods")
            .join("burstable")
            .join("podabc-123");
        write_cpu_stat(&expected);

        let resolver = CgroupPathResolver::new(&tmp);
        let (found, idx) = resolver.resolve(&id, None).expect("should resolve");
        assert_eq!(found, expected);
        assert_eq!(idx, 2); // cgroupfs_qos

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_directory_resolves_to_none() {
        let tmp = std::env::temp_dir().join(format!("mbcas-test-missing-{}", std::process::id()));
        let id = PodCgroupId {
            pod_uid: "zzz".to_string(),
            qos: QosClass::Guaranteed,
        };
        let resolver = CgroupPathResolver::new(&tmp);
        assert!(resolver.resolve(&id, None).is_none());
    }

    #[test]
    fn cached_template_is_tried_first() {
        let tmp = std::env::temp_dir().join(format!("mbcas-test-cache-{}", std::process::id()));
        let id = PodCgroupId {
            pod_uid: "cache-1".to_string(),
            qos: QosClass::BestEffort,
        };
        let expected = tmp.join("kubepods").join("besteffort").join("podcache-1");
        write_cpu_stat(&expected);

        let resolver = CgroupPathResolver::new(&tmp);
        let (_, idx) = resolver.resolve(&id, None).unwrap();
        let (_, idx_again) = resolver.resolve(&id, Some(idx)).unwrap();
        assert_eq!(idx, idx_again);

        let _ = fs::remove_dir_all(&tmp);
    }
}
