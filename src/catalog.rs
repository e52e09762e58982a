//! Routine catalog loaded from `routines.json`.

use std::{fs, io, path::Path, sync::Arc};

use log::info;
use thiserror::Error;

use crate::models::Routine;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Routines file not found")]
    NotFound,
    #[error("Failed to read routines file: {0}")]
    Io(#[source] io::Error),
    #[error("Invalid routines file format")]
    InvalidFormat(#[source] serde_json::Error),
    #[error("Routine '{id}' is invalid: {reason}")]
    InvalidRoutine { id: String, reason: String },
    #[error("Routine '{0}' appears more than once")]
    DuplicateId(String),
    #[error("No routine with id '{0}'")]
    UnknownRoutine(String),
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    routines: Vec<Arc<Routine>>,
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let contents = fs::read_to_string(path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => CatalogError::NotFound,
            _ => CatalogError::Io(err),
        })?;
        let catalog = Self::from_json(&contents)?;
        info!("loaded {} routines from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    pub fn from_json(contents: &str) -> Result<Self, CatalogError> {
        let routines: Vec<Routine> =
            serde_json::from_str(contents).map_err(CatalogError::InvalidFormat)?;
        Self::from_routines(routines)
    }

    pub fn from_routines(routines: Vec<Routine>) -> Result<Self, CatalogError> {
        let mut seen = std::collections::HashSet::new();
        for routine in &routines {
            validate(routine)?;
            if !seen.insert(routine.id.as_str()) {
                return Err(CatalogError::DuplicateId(routine.id.clone()));
            }
        }
        Ok(Self {
            routines: routines.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn routines(&self) -> &[Arc<Routine>] {
        &self.routines
    }

    pub fn len(&self) -> usize {
        self.routines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routines.is_empty()
    }

    pub fn find(&self, id: &str) -> Result<Arc<Routine>, CatalogError> {
        self.routines
            .iter()
            .find(|routine| routine.id == id)
            .cloned()
            .ok_or_else(|| CatalogError::UnknownRoutine(id.to_string()))
    }
}

fn validate(routine: &Routine) -> Result<(), CatalogError> {
    let invalid = |reason: String| CatalogError::InvalidRoutine {
        id: routine.id.clone(),
        reason,
    };

    if routine.id.trim().is_empty() {
        return Err(invalid("empty id".into()));
    }
    if routine.segments.is_empty() {
        return Err(invalid("no segments".into()));
    }
    if let Some(segment) = routine.segments.iter().find(|s| s.duration == 0) {
        return Err(invalid(format!("segment '{}' has zero duration", segment.phase)));
    }
    Ok(())
}
