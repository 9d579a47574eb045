use std::path::{Path, PathBuf};

use super::{Result, StoreError, read_optional, with_file_lock, write_atomic};
use crate::dsl::{Move, normalize_description, parse_block, parse_moves, serialize_moves};
use crate::validate::{check_duplicate_name, find_duplicate_name, validate_description, validate_move};

/// Client-side view over the library: both criteria are case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct MoveFilter {
    /// Keep moves carrying this tag
    pub tag: Option<String>,
    /// Substring of name or description
    pub search: Option<String>,
}

impl MoveFilter {
    pub fn matches(&self, mv: &Move) -> bool {
        if let Some(tag) = &self.tag {
            if !mv.has_tag(tag) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            if !mv.name.to_lowercase().contains(&needle)
                && !mv.description.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        true
    }
}

/// The whole move library, stored as one `.moves` file.
pub struct MoveStore {
    path: PathBuf,
}

impl MoveStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the file. A missing file is an empty library; a malformed one is an error.
    pub fn load(&self) -> Result<Vec<Move>> {
        let Some(text) = read_optional(&self.path)? else {
            return Ok(Vec::new());
        };
        parse_moves(&text).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Filtered moves sorted by name (case-insensitive).
    pub fn list(&self, filter: &MoveFilter) -> Result<Vec<Move>> {
        let mut moves: Vec<Move> = self
            .load()?
            .into_iter()
            .filter(|m| filter.matches(m))
            .collect();
        moves.sort_by_key(|m| m.name.to_lowercase());
        Ok(moves)
    }

    pub fn get(&self, id: &str) -> Result<Move> {
        self.load()?
            .into_iter()
            .find(|m| m.id == id)
            .ok_or_else(|| not_found(id))
    }

    fn modify<T>(&self, f: impl FnOnce(&mut Vec<Move>) -> Result<T>) -> Result<T> {
        with_file_lock(&self.path, || {
            let mut moves = self.load()?;
            let out = f(&mut moves)?;
            write_atomic(&self.path, &serialize_moves(&moves))?;
            Ok(out)
        })
    }

    /// Add a move from a client block (`# name`, description, tags).
    pub fn create(&self, block: &str) -> Result<Move> {
        let mv = parse_block(block);
        validate_move(&mv)?;

        self.modify(|moves| {
            check_duplicate_name(&mv.name, moves)?;
            moves.push(mv.clone());
            log::info!("Added move {:?} ({})", mv.name, mv.id);
            Ok(mv)
        })
    }

    /// Replace a move's content from a client block, keeping its id.
    ///
    /// Renaming onto another move's name is allowed; it is only logged.
    pub fn update(&self, id: &str, block: &str) -> Result<Move> {
        let mut edited = parse_block(block);
        validate_move(&edited)?;
        edited.id = id.to_string();

        self.modify(|moves| {
            let idx = moves
                .iter()
                .position(|m| m.id == id)
                .ok_or_else(|| not_found(id))?;

            let others: Vec<Move> = moves
                .iter()
                .filter(|m| m.id != id)
                .cloned()
                .collect();
            if let Some(clash) = find_duplicate_name(&edited.name, &others) {
                log::warn!(
                    "move {id} renamed to {:?}, which is also the name of move {}",
                    edited.name,
                    clash.id
                );
            }

            moves[idx] = edited.clone();
            log::info!("Updated move {:?} ({id})", edited.name);
            Ok(edited)
        })
    }

    /// Replace only the description (normalized), e.g. from a suggestion.
    pub fn set_description(&self, id: &str, description: &str) -> Result<Move> {
        let description = normalize_description(description);
        validate_description(&description)?;

        self.modify(|moves| {
            let mv = moves
                .iter_mut()
                .find(|m| m.id == id)
                .ok_or_else(|| not_found(id))?;
            mv.description = description;
            Ok(mv.clone())
        })
    }

    pub fn remove(&self, id: &str) -> Result<Move> {
        self.modify(|moves| {
            let idx = moves
                .iter()
                .position(|m| m.id == id)
                .ok_or_else(|| not_found(id))?;
            let removed = moves.remove(idx);
            log::info!("Removed move {:?} ({id})", removed.name);
            Ok(removed)
        })
    }
}

fn not_found(id: &str) -> StoreError {
    StoreError::NotFound {
        kind: "move",
        id: id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::ValidationError;

    const LIBRARY: &str = "# jab\nquick punch\npunch, basic\n@j1\n\n# cross\nrear hand punch\npunch\n@c1\n";

    fn store_with(contents: &str) -> (tempfile::TempDir, MoveStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("all.moves");
        std::fs::write(&path, contents).unwrap();
        (dir, MoveStore::new(path))
    }

    #[test]
    fn test_missing_file_is_empty_library() {
        let dir = tempfile::tempdir().unwrap();
        let store = MoveStore::new(dir.path().join("all.moves"));
        assert!(store.load().unwrap().is_empty());
        let mv = store.create("# Jab\nQuick punch.\n[punch]").unwrap();
        assert_eq!(store.get(&mv.id).unwrap().description, "quick punch");
    }

    #[test]
    fn test_duplicate_rejected_without_touching_file() {
        let (_dir, store) = store_with(LIBRARY);
        let before = std::fs::read(store.path()).unwrap();

        let err = store.create("# jab\nAnything\n").unwrap_err();
        assert!(matches!(
            err,
            StoreError::Invalid(ValidationError::DuplicateMoveName(_))
        ));
        assert!(matches!(
            store.create("# JAB\n"),
            Err(StoreError::Invalid(ValidationError::DuplicateMoveName(_)))
        ));
        assert_eq!(std::fs::read(store.path()).unwrap(), before);
    }

    #[test]
    fn test_empty_name_rejected() {
        let (_dir, store) = store_with(LIBRARY);
        assert!(matches!(
            store.create("#   \nno name"),
            Err(StoreError::Invalid(ValidationError::EmptyMoveName))
        ));
    }

    #[test]
    fn test_create_appends_in_insertion_order() {
        let (_dir, store) = store_with(LIBRARY);
        store.create("# Hook\nCurved punch!\n[punch] [power]").unwrap();
        let moves = store.load().unwrap();
        let names: Vec<_> = moves.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["jab", "cross", "Hook"]);
        assert_eq!(moves[2].tags, vec!["punch", "power"]);
    }

    #[test]
    fn test_corrupt_file_surfaces_line() {
        let (_dir, store) = store_with("# jab\nquick\n# cross\n@c1\n");
        let err = store.load().unwrap_err();
        match &err {
            StoreError::Corrupt { source, .. } => assert_eq!(source.line(), 3),
            other => panic!("unexpected error: {other}"),
        }
        assert!(store.create("# Hook").is_err());
    }

    #[test]
    fn test_update_keeps_id_and_allows_name_collision() {
        let (_dir, store) = store_with(LIBRARY);
        let updated = store.update("c1", "# Jab\nStraight punch\nPunch").unwrap();
        assert_eq!(updated.id, "c1");
        let moves = store.load().unwrap();
        assert_eq!(moves[1].name, "Jab");
        assert_eq!(moves[1].description, "straight punch");
        assert_eq!(moves.len(), 2);
    }

    #[test]
    fn test_update_missing() {
        let (_dir, store) = store_with(LIBRARY);
        assert!(matches!(
            store.update("nope", "# X"),
            Err(StoreError::NotFound { kind: "move", .. })
        ));
    }

    #[test]
    fn test_remove_and_set_description() {
        let (_dir, store) = store_with(LIBRARY);
        let mv = store.set_description("j1", "  Fast Lead Punch!! ").unwrap();
        assert_eq!(mv.description, "fast lead punch");
        store.remove("c1").unwrap();
        let moves = store.load().unwrap();
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].description, "fast lead punch");
        assert!(store.remove("c1").is_err());
    }

    #[test]
    fn test_hashtag_tags_rejected_and_library_still_loads() {
        let (_dir, store) = store_with(LIBRARY);
        let before = std::fs::read(store.path()).unwrap();

        let err = store.create("# Burpee\nfull body\n#cardio #hiit").unwrap_err();
        assert!(matches!(
            err,
            StoreError::Invalid(ValidationError::ReservedLineStart { field: "tags", .. })
        ));
        assert!(store.update("j1", "# Jab\n@quick\npunch").is_err());
        assert_eq!(std::fs::read(store.path()).unwrap(), before);
        assert_eq!(store.load().unwrap().len(), 2);

        // A '#' later in the line is fine and survives a reload.
        let mv = store.create("# Burpee\nfull body\ncardio #hiit").unwrap();
        let reloaded = store.get(&mv.id).unwrap();
        assert_eq!(reloaded.tags, vec!["cardio", "#hiit"]);
    }

    #[test]
    fn test_set_description_keeps_file_readable() {
        let (_dir, store) = store_with(LIBRARY);
        let before = std::fs::read(store.path()).unwrap();

        assert!(matches!(
            store.set_description("j1", "# A quick lead-hand punch."),
            Err(StoreError::Invalid(ValidationError::ReservedLineStart { .. }))
        ));
        assert!(matches!(
            store.set_description("j1", "lead hand\nrear hand"),
            Err(StoreError::Invalid(ValidationError::LineBreak("description")))
        ));
        assert_eq!(std::fs::read(store.path()).unwrap(), before);

        store.set_description("j1", "a jab, #1 punch").unwrap();
        let moves = store.load().unwrap();
        assert_eq!(moves[0].description, "a jab, #1 punch");
        assert_eq!(moves[0].tags, vec!["punch", "basic"]);
    }

    #[test]
    fn test_list_filters_and_sorts() {
        let (_dir, store) = store_with(LIBRARY);
        store.create("# Axe kick\nDownward heel strike\nKick, Legs").unwrap();

        let all = store.list(&MoveFilter::default()).unwrap();
        let names: Vec<_> = all.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Axe kick", "cross", "jab"]);

        let punches = store
            .list(&MoveFilter {
                tag: Some("PUNCH".to_string()),
                search: None,
            })
            .unwrap();
        assert_eq!(punches.len(), 2);

        let heel = store
            .list(&MoveFilter {
                tag: None,
                search: Some("Heel".to_string()),
            })
            .unwrap();
        assert_eq!(heel.len(), 1);
        assert_eq!(heel[0].name, "Axe kick");
    }
}
