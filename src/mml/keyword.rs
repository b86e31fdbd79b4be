//! Statement keywords recognized at the start of a line.

/// Every keyword the parser dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    NoteNames,
    Durations,
    MmlOctaves,
    Sfx,
    Instrument,
    Rate,
    Volume,
    Decay,
    Timbre,
    Pitch,
    Detached,
    Drum,
    Song,
    /// `fine`, `dal segno`, `da capo` and their one-word spellings.
    End,
    Segno,
    Mark,
    Time,
    Scale,
    Attack,
    Pattern,
    Fallthrough,
    At,
    Pickup,
    Resume,
    Mute,
    Solo,
    Tempo,
    Play,
    Stop,
    Include,
    Title,
    Author,
    Copyright,
}

impl Keyword {
    pub fn from_word(word: &str) -> Option<Self> {
        let kw = match word {
            "notenames" => Keyword::NoteNames,
            "durations" => Keyword::Durations,
            "mmloctaves" => Keyword::MmlOctaves,
            "sfx" => Keyword::Sfx,
            "instrument" => Keyword::Instrument,
            "rate" => Keyword::Rate,
            "volume" => Keyword::Volume,
            "decay" => Keyword::Decay,
            "timbre" => Keyword::Timbre,
            "pitch" => Keyword::Pitch,
            "detached" => Keyword::Detached,
            "drum" => Keyword::Drum,
            "song" => Keyword::Song,
            "fine" | "dal" | "dalSegno" | "da" | "daCapo" => Keyword::End,
            "segno" => Keyword::Segno,
            "mark" => Keyword::Mark,
            "time" => Keyword::Time,
            "scale" => Keyword::Scale,
            "attack" => Keyword::Attack,
            "pattern" => Keyword::Pattern,
            "fallthrough" => Keyword::Fallthrough,
            "at" => Keyword::At,
            "pickup" => Keyword::Pickup,
            "resume" => Keyword::Resume,
            "mute" => Keyword::Mute,
            "solo" => Keyword::Solo,
            "tempo" => Keyword::Tempo,
            "play" => Keyword::Play,
            "stop" => Keyword::Stop,
            "include" => Keyword::Include,
            "title" => Keyword::Title,
            "author" => Keyword::Author,
            "copyright" => Keyword::Copyright,
            _ => return None,
        };
        Some(kw)
    }

    /// Whether this keyword ends the object (instrument, sfx or pattern)
    /// currently being defined.
    pub fn closes_object(self) -> bool {
        matches!(
            self,
            Keyword::Drum
                | Keyword::Song
                | Keyword::End
                | Keyword::Segno
                | Keyword::Mark
                | Keyword::At
                | Keyword::Attack
                | Keyword::Play
                | Keyword::Stop
                | Keyword::Fallthrough
                | Keyword::Resume
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn song_end_spellings() {
        for word in ["fine", "dal", "dalSegno", "da", "daCapo"] {
            assert_eq!(Keyword::from_word(word), Some(Keyword::End), "{word}");
        }
    }

    #[test]
    fn keywords_are_case_sensitive() {
        assert_eq!(Keyword::from_word("Song"), None);
        assert_eq!(Keyword::from_word("song"), Some(Keyword::Song));
    }

    #[test]
    fn notes_are_not_keywords() {
        assert_eq!(Keyword::from_word("c"), None);
        assert_eq!(Keyword::from_word("r4"), None);
    }

    #[test]
    fn conductor_keywords_close_objects() {
        assert!(Keyword::Play.closes_object());
        assert!(Keyword::At.closes_object());
        assert!(!Keyword::Volume.closes_object());
        assert!(!Keyword::Tempo.closes_object());
    }
}
