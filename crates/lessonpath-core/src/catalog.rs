//! Read-only lesson catalog.
//!
//! Lessons are grouped into numbered modules; their order in the catalog
//! (module by module) defines the flattened index the unlock policy works
//! on. The bundled [`Catalog`] is loaded from a JSON file:
//!
//! ```json
//! { "modules": [ { "number": 1, "title": "Basics", "lessons": [
//!     { "id": "L1", "title": "Hello", "xp": 10, "badge": "starter",
//!       "screens": [ { "kind": "explanation", "title": "Hi", "body": "..." },
//!                    { "kind": "celebration", "xp": 10 } ] } ] } ] }
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::{CoreError, CoreResult};

/// One screen of a lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Screen {
    /// Reading material; always passable.
    Explanation { title: String, body: String },
    /// Multiple choice; `answer` is the index of the correct option.
    Quiz {
        question: String,
        options: Vec<String>,
        answer: usize,
        #[serde(default)]
        xp: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        explanation: Option<String>,
    },
    /// A hands-on task the presentation layer grades.
    Interactive {
        prompt: String,
        #[serde(default)]
        xp: u32,
    },
    /// End-of-lesson screen; its `xp` is what the lesson awards.
    Celebration {
        #[serde(default)]
        title: String,
        xp: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        badge: Option<String>,
    },
}

/// Screen kind without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenKind {
    Explanation,
    Quiz,
    Interactive,
    Celebration,
}

impl Screen {
    #[must_use]
    pub const fn kind(&self) -> ScreenKind {
        match self {
            Self::Explanation { .. } => ScreenKind::Explanation,
            Self::Quiz { .. } => ScreenKind::Quiz,
            Self::Interactive { .. } => ScreenKind::Interactive,
            Self::Celebration { .. } => ScreenKind::Celebration,
        }
    }

    /// Whether the screen must be answered correctly before moving on.
    #[must_use]
    pub const fn requires_answer(&self) -> bool {
        matches!(self, Self::Quiz { .. } | Self::Interactive { .. })
    }
}

/// Catalog entry for one lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LessonSummary {
    pub id: String,
    pub module_number: u32,
    /// Zero-based position across all modules.
    pub index: usize,
    pub title: String,
    pub xp_value: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
}

/// A lesson with its screens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonContent {
    pub summary: LessonSummary,
    pub screens: Vec<Screen>,
}

/// Module as written in a catalog file.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogModule {
    pub number: u32,
    pub title: String,
    #[serde(default)]
    pub lessons: Vec<CatalogLesson>,
}

/// Lesson as written in a catalog file.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogLesson {
    pub id: String,
    pub title: String,
    pub xp: u32,
    #[serde(default)]
    pub badge: Option<String>,
    #[serde(default)]
    pub screens: Vec<Screen>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    modules: Vec<CatalogModule>,
}

/// Read access to lesson content.
pub trait ContentSource: Send + Sync {
    /// All lessons in catalog order.
    fn lessons(&self) -> &[LessonSummary];

    /// Full content of one lesson.
    ///
    /// Returns `Err(CoreError::LessonNotFound)` for an unknown id.
    fn lesson(&self, lesson_id: &str) -> CoreResult<LessonContent>;

    /// Catalog entry for one lesson, if it exists.
    fn summary(&self, lesson_id: &str) -> Option<&LessonSummary> {
        self.lessons().iter().find(|l| l.id == lesson_id)
    }
}

/// In-memory catalog built from modules.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    summaries: Vec<LessonSummary>,
    screens: HashMap<String, Vec<Screen>>,
}

impl Catalog {
    /// Build a catalog, validating ids and quiz answers.
    pub fn from_modules(modules: Vec<CatalogModule>) -> CoreResult<Self> {
        let mut catalog = Self::default();

        for module in modules {
            for lesson in module.lessons {
                if lesson.id.trim().is_empty() {
                    return Err(catalog_error(format!(
                        "lesson '{}' in module {} has an empty id",
                        lesson.title, module.number
                    )));
                }
                if catalog.screens.contains_key(&lesson.id) {
                    return Err(catalog_error(format!("duplicate lesson id '{}'", lesson.id)));
                }
                validate_screens(&lesson.id, &lesson.screens)?;

                catalog.summaries.push(LessonSummary {
                    id: lesson.id.clone(),
                    module_number: module.number,
                    index: catalog.summaries.len(),
                    title: lesson.title,
                    xp_value: lesson.xp,
                    badge: lesson.badge,
                });
                catalog.screens.insert(lesson.id, lesson.screens);
            }
        }

        Ok(catalog)
    }

    /// Parse a catalog from JSON text.
    pub fn from_json(content: &str) -> CoreResult<Self> {
        let file: CatalogFile = serde_json::from_str(content)
            .map_err(|e| catalog_error(format!("invalid catalog JSON: {e}")))?;
        Self::from_modules(file.modules)
    }

    /// Load a catalog file.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            catalog_error(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&content)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }
}

impl ContentSource for Catalog {
    fn lessons(&self) -> &[LessonSummary] {
        &self.summaries
    }

    fn lesson(&self, lesson_id: &str) -> CoreResult<LessonContent> {
        let summary = self
            .summary(lesson_id)
            .ok_or_else(|| CoreError::LessonNotFound {
                lesson_id: lesson_id.to_string(),
            })?
            .clone();
        let screens = self.screens.get(lesson_id).cloned().unwrap_or_default();
        Ok(LessonContent { summary, screens })
    }
}

fn validate_screens(lesson_id: &str, screens: &[Screen]) -> CoreResult<()> {
    for (pos, screen) in screens.iter().enumerate() {
        if let Screen::Quiz {
            options, answer, ..
        } = screen
        {
            if *answer >= options.len() {
                return Err(catalog_error(format!(
                    "lesson '{lesson_id}' screen {pos}: answer {answer} is out of range \
                     for {} options",
                    options.len()
                )));
            }
        }
    }
    Ok(())
}

fn catalog_error(detail: String) -> CoreError {
    CoreError::Catalog { detail }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"{
        "modules": [
            { "number": 1, "title": "Basics", "lessons": [
                { "id": "L1", "title": "Hello", "xp": 10, "badge": "starter", "screens": [
                    { "kind": "explanation", "title": "Hi", "body": "Welcome" },
                    { "kind": "quiz", "question": "2+2?", "options": ["3", "4"],
                      "answer": 1, "xp": 5 },
                    { "kind": "celebration", "title": "Done", "xp": 10, "badge": "starter" }
                ] },
                { "id": "L2", "title": "Next", "xp": 15 }
            ] },
            { "number": 2, "title": "More", "lessons": [
                { "id": "L3", "title": "Deeper", "xp": 20 }
            ] }
        ]
    }"#;

    #[test]
    fn test_flattened_order_across_modules() {
        let catalog = Catalog::from_json(SAMPLE).unwrap();
        let ids: Vec<_> = catalog.lessons().iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["L1", "L2", "L3"]);

        let l3 = catalog.summary("L3").unwrap();
        assert_eq!(l3.index, 2);
        assert_eq!(l3.module_number, 2);
    }

    #[test]
    fn test_lesson_detail() {
        let catalog = Catalog::from_json(SAMPLE).unwrap();
        let lesson = catalog.lesson("L1").unwrap();
        assert_eq!(lesson.screens.len(), 3);
        assert_eq!(lesson.screens[1].kind(), ScreenKind::Quiz);
        assert!(matches!(lesson.screens[2], Screen::Celebration { xp: 10, .. }));
        assert_eq!(lesson.summary.badge.as_deref(), Some("starter"));
    }

    #[test]
    fn test_unknown_lesson_is_not_found() {
        let catalog = Catalog::from_json(SAMPLE).unwrap();
        let err = catalog.lesson("L99").unwrap_err();
        assert!(matches!(err, CoreError::LessonNotFound { ref lesson_id } if lesson_id == "L99"));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let json = r#"{"modules": [{"number": 1, "title": "A", "lessons": [
            {"id": "L1", "title": "a", "xp": 1},
            {"id": "L1", "title": "b", "xp": 1}
        ]}]}"#;
        let err = Catalog::from_json(json).unwrap_err();
        assert!(err.to_string().contains("duplicate lesson id"));
    }

    #[test]
    fn test_quiz_answer_out_of_range_rejected() {
        let json = r#"{"modules": [{"number": 1, "title": "A", "lessons": [
            {"id": "L1", "title": "a", "xp": 1, "screens": [
                {"kind": "quiz", "question": "?", "options": ["x"], "answer": 3}
            ]}
        ]}]}"#;
        assert!(Catalog::from_json(json).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, SAMPLE).unwrap();
        assert_eq!(Catalog::load(&path).unwrap().lessons().len(), 3);

        let missing = Catalog::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(missing, CoreError::Catalog { .. }));
    }
}
