//! Collaborator interfaces at the engine boundary.
//!
//! The engine never talks to a cluster directly: handlers delegate every
//! remote effect to a [`ClusterGateway`], and deferred file fields are
//! resolved through a [`FileLoader`] before a handler runs. Both are
//! synchronous and may block on I/O; the engine spawns no background
//! work.

pub mod memory;

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;
use thiserror::Error;

/// Remote object kinds the gateway can manipulate. Ordered so it can
/// key the in-memory gateway's object map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectKind {
    Secret,
    ConfigMap,
    Parameter,
    Namespace,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Secret => "secret",
            ObjectKind::ConfigMap => "configmap",
            ObjectKind::Parameter => "parameter",
            ObjectKind::Namespace => "namespace",
        }
    }
}

/// A remote object as the gateway reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterObject {
    pub kind: ObjectKind,
    pub namespace: String,
    pub name: String,
    /// Labels attached to the object. BTreeMap keeps listings stable.
    pub labels: BTreeMap<String, String>,
    pub payload: Value,
}

/// Specification of a job to submit.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    pub script_name: String,
    pub script_type: String,
    pub engine: String,
    pub code: String,
    /// Merged job parameters: configmap params first, explicit args win.
    pub params: BTreeMap<String, String>,
    /// (secret name, key, mount path) triples.
    pub secret_mounts: Vec<(String, String, String)>,
}

/// Typed failure surfaced by the gateway.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("{kind} '{name}' not found in namespace '{namespace}'")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    #[error("{kind} '{name}' already exists in namespace '{namespace}'")]
    AlreadyExists {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    #[error("remote call failed: {message}")]
    Remote { message: String },

    #[error("file '{path}' could not be read: {message}")]
    FileRead { path: String, message: String },
}

/// External collaborator performing remote object CRUD and job
/// submission. All calls are namespace-scoped and synchronous.
pub trait ClusterGateway {
    fn create_object(
        &mut self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
        labels: BTreeMap<String, String>,
        payload: Value,
    ) -> Result<ClusterObject, GatewayError>;

    fn get_object(
        &self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
    ) -> Result<ClusterObject, GatewayError>;

    fn list_objects(
        &self,
        kind: ObjectKind,
        namespace: &str,
    ) -> Result<Vec<ClusterObject>, GatewayError>;

    fn update_object(
        &mut self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
        payload: Value,
    ) -> Result<ClusterObject, GatewayError>;

    fn delete_object(
        &mut self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), GatewayError>;

    fn submit_job(&mut self, namespace: &str, spec: JobSpec) -> Result<String, GatewayError>;
}

/// Resolves a local path referenced by a command field into bytes before
/// the command reaches a handler.
pub trait FileLoader {
    fn load(&self, path: &Path) -> Result<Vec<u8>, GatewayError>;
}

/// Filesystem-backed loader used outside tests.
#[derive(Debug, Default)]
pub struct FsFileLoader;

impl FileLoader for FsFileLoader {
    fn load(&self, path: &Path) -> Result<Vec<u8>, GatewayError> {
        std::fs::read(path).map_err(|e| GatewayError::FileRead {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}
