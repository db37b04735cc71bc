use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::SynthesisResult;

/// One synthesis call as the service hands it to a model.
#[derive(Debug, Clone, Copy)]
pub struct SpeechRequest<'a> {
    pub text: &'a str,
    /// Normalized service language code.
    pub language: &'a str,
    pub voice: Option<&'a str>,
    /// Reference recording to clone; only sent to cloning-capable models.
    pub speaker_wav: Option<&'a Path>,
    pub speed: f32,
}

/// A resident speech model.
///
/// Models are driven from blocking worker threads, one request at a time.
pub trait SpeechModel: Send {
    fn synthesize(&mut self, request: &SpeechRequest<'_>) -> Result<SynthesisResult>;

    /// Whether `speaker_wav` is honoured.
    fn supports_cloning(&self) -> bool {
        false
    }

    /// Short human-readable description for logs.
    fn describe(&self) -> String;
}

pub type SharedModel = Arc<Mutex<Box<dyn SpeechModel>>>;

#[derive(Clone)]
pub struct ModelEntry {
    pub handle: SharedModel,
    /// Voice used when the request names none.
    pub voice: Option<String>,
    pub cloning: bool,
}

/// Loaded models by id, in load order.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    entries: Vec<(String, ModelEntry)>,
}

impl ModelRegistry {
    /// Register `model` under `id`, replacing any previous entry.
    pub fn insert(&mut self, id: &str, model: Box<dyn SpeechModel>, voice: Option<String>) {
        let cloning = model.supports_cloning();
        log::info!("Registered model '{id}': {}", model.describe());
        self.put(
            id,
            ModelEntry {
                handle: Arc::new(Mutex::new(model)),
                voice,
                cloning,
            },
        );
    }

    /// Register `id` as another name for the model behind `target`, with its
    /// own default voice. Returns false when `target` is unknown.
    pub fn alias(&mut self, id: &str, target: &str, voice: Option<String>) -> bool {
        let Some(entry) = self.get(target) else {
            return false;
        };
        let entry = ModelEntry {
            handle: Arc::clone(&entry.handle),
            voice,
            cloning: entry.cloning,
        };
        self.put(id, entry);
        true
    }

    fn put(&mut self, id: &str, entry: ModelEntry) {
        match self.entries.iter_mut().find(|(name, _)| name == id) {
            Some((_, existing)) => *existing = entry,
            None => self.entries.push((id.to_string(), entry)),
        }
    }

    pub fn get(&self, id: &str) -> Option<&ModelEntry> {
        self.entries
            .iter()
            .find(|(name, _)| name == id)
            .map(|(_, entry)| entry)
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
