use crate::eid::Eid;
use crate::language::Language;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::hash::Hash;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

/// What kind of content a note captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteKind {
    #[default]
    Text,
    Image,
    Link,
}

impl NoteKind {
    /// Classify a draft: an image payload wins, then a bare URL, then text.
    pub fn detect(text: Option<&str>, has_image: bool) -> NoteKind {
        if has_image {
            return NoteKind::Image;
        }
        let trimmed = text.unwrap_or_default().trim();
        if !trimmed.contains(char::is_whitespace) {
            if let Ok(parsed) = url::Url::parse(trimmed) {
                if matches!(parsed.scheme(), "http" | "https") {
                    return NoteKind::Link;
                }
            }
        }
        NoteKind::Text
    }
}

/// A captured note. Immutable after creation, except for deletion and
/// embedding backfill.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Note {
    pub id: Eid,

    /// Raw captured text, or a content-type marker for image-only notes.
    pub content: String,
    pub kind: NoteKind,

    /// Base64 image payload. Present iff `kind == Image`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,

    pub summary: String,
    pub tags: Vec<String>,
    pub category: String,

    /// Epoch milliseconds.
    pub created_at: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Hash for Note {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl PartialEq for Note {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Note {}

/// Capture input, before annotation.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NoteDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Base64 image payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,

    /// Display language override for this capture.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
}

impl NoteDraft {
    pub fn is_empty(&self) -> bool {
        self.text.as_deref().map_or(true, |t| t.trim().is_empty()) && self.image_data.is_none()
    }
}

/// Plain listing filter over the stored notes. This is the surrounding
/// app's substring search, not the natural-language recall path.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ListQuery {
    pub id: Option<Eid>,
    pub text: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub kind: Option<NoteKind>,

    #[serde(default)]
    pub limit: Option<usize>,
}

impl ListQuery {
    pub fn lowercase(&mut self) {
        self.text = self.text.as_ref().map(|text| text.to_lowercase());
        self.category = self.category.as_ref().map(|c| c.to_lowercase());
        self.tags = self
            .tags
            .as_ref()
            .map(|tags| tags.iter().map(|t| t.to_lowercase()).collect::<Vec<_>>());
    }

    fn is_unfiltered(&self) -> bool {
        self.id.is_none()
            && self.text.is_none()
            && self.category.is_none()
            && (self.tags.is_none() || self.tags.as_deref().unwrap_or_default().is_empty())
            && self.kind.is_none()
    }
}

pub trait NoteStore: Send + Sync {
    /// Snapshot of the full collection, in insertion order.
    fn all(&self) -> Vec<Note>;
    fn get(&self, id: &Eid) -> Option<Note>;
    fn create(&self, note: Note) -> anyhow::Result<Note>;
    fn delete(&self, id: &Eid) -> anyhow::Result<bool>;
    fn set_embedding(&self, id: &Eid, embedding: Vec<f32>) -> anyhow::Result<()>;
    fn search(&self, query: ListQuery) -> Vec<Note>;
    /// Distinct category names, first-seen order.
    fn categories(&self) -> Vec<String>;
    /// Distinct tags, sorted.
    fn tags(&self) -> Vec<String>;
    fn total(&self) -> usize;
}

/// JSON-file note store: the whole collection lives in memory and is
/// flushed to `notes.json` on every mutation.
#[derive(Debug, Clone, Default)]
pub struct BackendJson {
    list: Arc<RwLock<Vec<Note>>>,
    path: PathBuf,
}

impl BackendJson {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let path = PathBuf::from(path);

        let notes = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice::<Vec<Note>>(&bytes)
                .with_context(|| format!("malformed note database at {}", path.display()))?,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                log::info!("Creating new note database at {}", path.display());
                vec![]
            }
            Err(err) => return Err(err).context("failed to read note database"),
        };

        let store = BackendJson {
            list: Arc::new(RwLock::new(notes)),
            path,
        };

        if !store.path.exists() {
            store.save()?;
        }

        Ok(store)
    }

    fn save(&self) -> anyhow::Result<()> {
        let notes = self.list.read().unwrap();

        let data = serde_json::to_vec_pretty(&*notes)?;
        let temp_path = self.path.with_extension("json-tmp");
        std::fs::write(&temp_path, data)?;
        std::fs::rename(&temp_path, &self.path)?;

        Ok(())
    }

    #[cfg(test)]
    pub fn list(&self) -> Arc<RwLock<Vec<Note>>> {
        self.list.clone()
    }
}

impl NoteStore for BackendJson {
    fn all(&self) -> Vec<Note> {
        self.list.read().unwrap().clone()
    }

    fn get(&self, id: &Eid) -> Option<Note> {
        self.list.read().unwrap().iter().find(|n| &n.id == id).cloned()
    }

    fn create(&self, note: Note) -> anyhow::Result<Note> {
        self.list.write().unwrap().push(note.clone());
        self.save()?;
        Ok(note)
    }

    fn delete(&self, id: &Eid) -> anyhow::Result<bool> {
        let mut notes = self.list.write().unwrap();
        let found = notes.iter().position(|n| &n.id == id).map(|idx| {
            notes.remove(idx);
        });
        drop(notes);

        if found.is_some() {
            self.save()?;
        }

        Ok(found.is_some())
    }

    fn set_embedding(&self, id: &Eid, embedding: Vec<f32>) -> anyhow::Result<()> {
        let mut notes = self.list.write().unwrap();
        let note = notes
            .iter_mut()
            .find(|n| &n.id == id)
            .ok_or_else(|| anyhow::anyhow!("note {id} not found"))?;
        note.embedding = Some(embedding);
        drop(notes);

        self.save()
    }

    fn search(&self, query: ListQuery) -> Vec<Note> {
        let notes = self.list.read().unwrap();

        let mut query = query;
        query.lowercase();

        if query.is_unfiltered() {
            return notes.clone();
        }

        let mut output = vec![];

        for note in notes.iter() {
            if let Some(id) = &query.id {
                if &note.id != id {
                    continue;
                }
            }

            if let Some(kind) = &query.kind {
                if &note.kind != kind {
                    continue;
                }
            }

            if let Some(category) = &query.category {
                if !note.category.eq_ignore_ascii_case(category) {
                    continue;
                }
            }

            if let Some(tags) = &query.tags {
                if !tags.is_empty() {
                    let note_tags = note
                        .tags
                        .iter()
                        .map(|t| t.to_lowercase())
                        .collect::<Vec<_>>();
                    if !tags.iter().any(|t| note_tags.contains(t)) {
                        continue;
                    }
                }
            }

            if let Some(text) = &query.text {
                let in_content = note.content.to_lowercase().contains(text);
                let in_summary = note.summary.to_lowercase().contains(text);
                if !in_content && !in_summary {
                    continue;
                }
            }

            output.push(note.clone());

            let id_query = query.id.is_some();
            let limit_reached =
                query.limit.is_some() && output.len() >= query.limit.unwrap_or_default();
            if id_query || limit_reached {
                break;
            }
        }

        output
    }

    fn categories(&self) -> Vec<String> {
        let notes = self.list.read().unwrap();
        let mut seen = vec![];
        for note in notes.iter() {
            if !note.category.is_empty()
                && !seen
                    .iter()
                    .any(|c: &String| c.eq_ignore_ascii_case(&note.category))
            {
                seen.push(note.category.clone());
            }
        }
        seen
    }

    fn tags(&self) -> Vec<String> {
        let notes = self.list.read().unwrap();
        let mut tags: Vec<String> = notes
            .iter()
            .flat_map(|n| n.tags.iter())
            .map(|t| t.to_lowercase())
            .collect();
        tags.sort();
        tags.dedup();
        tags
    }

    fn total(&self) -> usize {
        self.list.read().unwrap().len()
    }
}
