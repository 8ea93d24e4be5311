//! In-memory gateway double.
//!
//! Keeps the same visibility semantics a real cluster would show the
//! engine (create conflicts, get/delete misses) without any I/O. Used by
//! the test suites and handy for local experiments.

use std::collections::BTreeMap;

use serde_json::Value;

use super::{ClusterGateway, ClusterObject, FileLoader, GatewayError, JobSpec, ObjectKind};

#[derive(Debug, Default)]
pub struct MemoryGateway {
    // Keyed by (kind, namespace, name); BTreeMap gives stable listings.
    objects: BTreeMap<(ObjectKind, String, String), ClusterObject>,
    jobs: Vec<(String, JobSpec)>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs submitted so far, in submission order.
    pub fn submitted_jobs(&self) -> &[(String, JobSpec)] {
        &self.jobs
    }

    pub fn object_count(&self, kind: ObjectKind) -> usize {
        self.objects.keys().filter(|(k, _, _)| *k == kind).count()
    }
}

impl ClusterGateway for MemoryGateway {
    fn create_object(
        &mut self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
        labels: BTreeMap<String, String>,
        payload: Value,
    ) -> Result<ClusterObject, GatewayError> {
        let key = (kind, namespace.to_string(), name.to_string());
        if self.objects.contains_key(&key) {
            return Err(GatewayError::AlreadyExists {
                kind: kind.as_str(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        }
        let obj = ClusterObject {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
            labels,
            payload,
        };
        self.objects.insert(key, obj.clone());
        Ok(obj)
    }

    fn get_object(
        &self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
    ) -> Result<ClusterObject, GatewayError> {
        self.objects
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| GatewayError::NotFound {
                kind: kind.as_str(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    fn list_objects(
        &self,
        kind: ObjectKind,
        namespace: &str,
    ) -> Result<Vec<ClusterObject>, GatewayError> {
        Ok(self
            .objects
            .values()
            .filter(|o| o.kind == kind && o.namespace == namespace)
            .cloned()
            .collect())
    }

    fn update_object(
        &mut self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
        payload: Value,
    ) -> Result<ClusterObject, GatewayError> {
        let key = (kind, namespace.to_string(), name.to_string());
        match self.objects.get_mut(&key) {
            Some(obj) => {
                obj.payload = payload;
                Ok(obj.clone())
            }
            None => Err(GatewayError::NotFound {
                kind: kind.as_str(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
        }
    }

    fn delete_object(
        &mut self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), GatewayError> {
        let key = (kind, namespace.to_string(), name.to_string());
        match self.objects.remove(&key) {
            Some(_) => Ok(()),
            None => Err(GatewayError::NotFound {
                kind: kind.as_str(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
        }
    }

    fn submit_job(&mut self, namespace: &str, spec: JobSpec) -> Result<String, GatewayError> {
        let job_id = format!("job-{}-{}", spec.script_name, self.jobs.len() + 1);
        self.jobs.push((namespace.to_string(), spec));
        Ok(job_id)
    }
}

/// File loader backed by an in-memory path map.
#[derive(Debug, Default)]
pub struct MemoryFileLoader {
    files: BTreeMap<String, Vec<u8>>,
}

impl MemoryFileLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), content.into());
    }
}

impl FileLoader for MemoryFileLoader {
    fn load(&self, path: &std::path::Path) -> Result<Vec<u8>, GatewayError> {
        let key = path.to_string_lossy().to_string();
        self.files
            .get(&key)
            .cloned()
            .ok_or_else(|| GatewayError::FileRead {
                path: key,
                message: "no such file".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_then_duplicate_conflicts() {
        let mut gw = MemoryGateway::new();
        gw.create_object(
            ObjectKind::Secret,
            "default",
            "tok",
            BTreeMap::new(),
            json!({"k": "v"}),
        )
        .unwrap();

        let err = gw
            .create_object(
                ObjectKind::Secret,
                "default",
                "tok",
                BTreeMap::new(),
                json!({}),
            )
            .unwrap_err();
        assert!(matches!(err, GatewayError::AlreadyExists { .. }));
    }

    #[test]
    fn list_is_namespace_scoped() {
        let mut gw = MemoryGateway::new();
        gw.create_object(
            ObjectKind::ConfigMap,
            "ns-a",
            "cm1",
            BTreeMap::new(),
            json!({}),
        )
        .unwrap();
        gw.create_object(
            ObjectKind::ConfigMap,
            "ns-b",
            "cm2",
            BTreeMap::new(),
            json!({}),
        )
        .unwrap();

        let listed = gw.list_objects(ObjectKind::ConfigMap, "ns-a").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "cm1");
    }

    #[test]
    fn delete_miss_is_not_found() {
        let mut gw = MemoryGateway::new();
        let err = gw
            .delete_object(ObjectKind::Parameter, "default", "ghost")
            .unwrap_err();
        assert!(matches!(err, GatewayError::NotFound { .. }));
    }
}
