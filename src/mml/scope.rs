//! Entity tables, scoped name lookup and the parser's scope state.

use std::collections::HashMap;

use serde::Serialize;

use super::drum::Drum;
use super::error::{CompileError, Result};
use super::field::SetOnce;
use super::instrument::Instrument;
use super::pattern::Pattern;
use super::render::Entity;
use super::sfx::SoundEffect;
use super::song::Song;

/// Entities of one kind, in definition order, indexed by qualified name.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct Table<T> {
    items: Vec<T>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T: Entity> Table<T> {
    /// Add an entity, failing if its name is taken. `kind` names the table
    /// for the error message.
    pub fn insert(&mut self, item: T, kind: &str) -> Result<usize> {
        if let Some(&idx) = self.index.get(item.name()) {
            let prev = self.items[idx].loc();
            return Err(CompileError::redefinition(format!(
                "{kind} {} was already defined on {}",
                item.name(),
                prev.cite(item.loc())
            )));
        }
        let idx = self.items.len();
        self.index.insert(item.name().to_string(), idx);
        self.items.push(item);
        Ok(idx)
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.index.get(name).map(|&i| &self.items[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn at(&self, idx: usize) -> Option<&T> {
        self.items.get(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut T> {
        self.items.get_mut(idx)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Look up `name` as seen from inside `scope`.
    ///
    /// Tries `scope::name`, then drops the last component of `scope` and
    /// retries, ending at top level. A name starting with `::` is global.
    pub fn resolve(&self, name: &str, scope: &str) -> Option<&T> {
        if let Some(global) = name.strip_prefix("::") {
            return self.get(global);
        }
        let mut prefix = Some(scope).filter(|s| !s.is_empty());
        loop {
            let found = match prefix {
                Some(p) => self.get(&format!("{p}::{name}")),
                None => self.get(name),
            };
            if found.is_some() {
                return found;
            }
            prefix = prefix?.rsplit_once("::").map(|(outer, _)| outer);
        }
    }
}

/// Qualify a name defined inside a song.
pub fn qualify(name: &str, song: Option<&str>) -> String {
    match song {
        Some(song) => format!("{song}::{name}"),
        None => name.to_string(),
    }
}

/// The object that property keywords apply to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectRef {
    Sfx(usize),
    Instrument(usize),
    Pattern(usize),
}

impl ObjectRef {
    pub fn kind(self) -> &'static str {
        match self {
            ObjectRef::Sfx(_) => "sfx",
            ObjectRef::Instrument(_) => "instrument",
            ObjectRef::Pattern(_) => "pattern",
        }
    }
}

/// Where the parser is: outside or inside a song, with or without an
/// open object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    TopLevel,
    TopLevelObject(ObjectRef),
    Song(usize),
    SongObject(usize, ObjectRef),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    OpenObject(ObjectRef),
    CloseObject,
    OpenSong(usize),
    CloseSong,
}

impl ScopeState {
    pub fn apply(self, transition: Transition) -> Result<ScopeState> {
        use ScopeState::*;
        use Transition::*;
        let next = match (self, transition) {
            (TopLevel | TopLevelObject(_), OpenObject(obj)) => TopLevelObject(obj),
            (Song(s) | SongObject(s, _), OpenObject(obj)) => SongObject(s, obj),
            (TopLevel | TopLevelObject(_), CloseObject) => TopLevel,
            (Song(s) | SongObject(s, _), CloseObject) => Song(s),
            (TopLevel | TopLevelObject(_), OpenSong(s)) => Song(s),
            (Song(_) | SongObject(..), OpenSong(_)) => {
                return Err(CompileError::structural("a song is already open"))
            }
            (Song(_) | SongObject(..), CloseSong) => TopLevel,
            (TopLevel | TopLevelObject(_), CloseSong) => {
                return Err(CompileError::scope("no song is open"))
            }
        };
        Ok(next)
    }

    pub fn song(self) -> Option<usize> {
        match self {
            ScopeState::Song(s) | ScopeState::SongObject(s, _) => Some(s),
            _ => None,
        }
    }

    pub fn object(self) -> Option<ObjectRef> {
        match self {
            ScopeState::TopLevelObject(o) | ScopeState::SongObject(_, o) => Some(o),
            _ => None,
        }
    }

    /// What the parser is inside of, for error messages.
    pub fn describe(self) -> &'static str {
        match self.object() {
            Some(obj) => obj.kind(),
            None if self.song().is_some() => "song",
            None => "top level",
        }
    }
}

/// Album-wide metadata.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Metadata {
    pub title: SetOnce<String>,
    pub author: SetOnce<String>,
    pub copyright: SetOnce<String>,
}

/// The song and row where playback starts when debugging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResumePoint {
    pub song: String,
    pub rows: u32,
}

/// Everything defined in an MML input.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Score {
    pub sfx: Table<SoundEffect>,
    pub instruments: Table<Instrument>,
    pub drums: Table<Drum>,
    pub patterns: Table<Pattern>,
    pub songs: Table<Song>,
    pub metadata: Metadata,
    pub resume: SetOnce<ResumePoint>,
}
