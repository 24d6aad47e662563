use std::collections::BTreeMap;

/// Which comic flow a chat is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogueKind {
    /// `/dokaku`: three text-only generations composited locally.
    Legacy,
    /// `/dongzhuo`: one remote generation from two uploaded references.
    OneShot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    AwaitFirst,
    AwaitSecond,
    Rendering,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoInput {
    pub bytes: Vec<u8>,
    /// Path reported by the chat service, used for the file suffix.
    pub file_path: String,
    /// Public URL after an object-store upload, when one succeeded.
    pub public_url: Option<String>,
}

impl PhotoInput {
    pub fn suffix(&self) -> String {
        self.file_path
            .rsplit('/')
            .next()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| format!(".{}", ext.to_ascii_lowercase()))
            .filter(|ext| ext.len() > 1)
            .unwrap_or_else(|| ".jpg".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub kind: DialogueKind,
    pub owner: i64,
    pub stage: Stage,
    pub first: Option<PhotoInput>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// Another user owns the chat's session; the command is ignored.
    Busy { owner: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoOutcome {
    Ignored,
    AwaitingSecond {
        kind: DialogueKind,
    },
    /// Both photos collected; the session is now `Rendering` and must be
    /// closed with `finish` whatever the render outcome.
    Ready {
        kind: DialogueKind,
        first: PhotoInput,
        second: PhotoInput,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled(DialogueKind),
    NotOwner,
    NoSession,
}

/// One dialogue per chat, owned by the user who started it.
#[derive(Debug, Clone, Default)]
pub struct SessionTable {
    sessions: BTreeMap<i64, Session>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, chat: i64) -> Option<&Session> {
        self.sessions.get(&chat)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// The owner restarting replaces their session; others are turned away.
    pub fn start(&mut self, chat: i64, user: i64, kind: DialogueKind) -> StartOutcome {
        if let Some(existing) = self.sessions.get(&chat) {
            if existing.owner != user {
                return StartOutcome::Busy {
                    owner: existing.owner,
                };
            }
        }
        self.sessions.insert(
            chat,
            Session {
                kind,
                owner: user,
                stage: Stage::AwaitFirst,
                first: None,
            },
        );
        StartOutcome::Started
    }

    pub fn accept_photo(&mut self, chat: i64, user: i64, photo: PhotoInput) -> PhotoOutcome {
        let Some(session) = self.sessions.get_mut(&chat) else {
            return PhotoOutcome::Ignored;
        };
        if session.owner != user {
            return PhotoOutcome::Ignored;
        }
        match session.stage {
            Stage::AwaitFirst => {
                session.first = Some(photo);
                session.stage = Stage::AwaitSecond;
                PhotoOutcome::AwaitingSecond { kind: session.kind }
            }
            Stage::AwaitSecond => match session.first.take() {
                Some(first) => {
                    session.stage = Stage::Rendering;
                    PhotoOutcome::Ready {
                        kind: session.kind,
                        first,
                        second: photo,
                    }
                }
                None => {
                    session.first = Some(photo);
                    PhotoOutcome::AwaitingSecond { kind: session.kind }
                }
            },
            Stage::Rendering => PhotoOutcome::Ignored,
        }
    }

    /// Session waiting on a photo from `user`, for "please send a photo"
    /// reminders.
    pub fn awaiting_photo(&self, chat: i64, user: i64) -> Option<(DialogueKind, Stage)> {
        self.sessions
            .get(&chat)
            .filter(|session| session.owner == user && session.stage != Stage::Rendering)
            .map(|session| (session.kind, session.stage))
    }

    pub fn cancel(&mut self, chat: i64, user: i64) -> CancelOutcome {
        match self.sessions.get(&chat) {
            None => CancelOutcome::NoSession,
            Some(session) if session.owner != user => CancelOutcome::NotOwner,
            Some(_) => match self.sessions.remove(&chat) {
                Some(session) => CancelOutcome::Cancelled(session.kind),
                None => CancelOutcome::NoSession,
            },
        }
    }

    pub fn finish(&mut self, chat: i64) -> Option<Session> {
        self.sessions.remove(&chat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn photo(name: &str) -> PhotoInput {
        PhotoInput {
            bytes: name.as_bytes().to_vec(),
            file_path: format!("photos/{name}.jpg"),
            public_url: None,
        }
    }

    #[test]
    fn two_photos_from_the_owner_make_a_render() {
        let mut table = SessionTable::new();
        assert_eq!(table.start(1, 10, DialogueKind::Legacy), StartOutcome::Started);
        assert_eq!(
            table.accept_photo(1, 10, photo("a")),
            PhotoOutcome::AwaitingSecond {
                kind: DialogueKind::Legacy
            }
        );
        match table.accept_photo(1, 10, photo("b")) {
            PhotoOutcome::Ready {
                kind,
                first,
                second,
            } => {
                assert_eq!(kind, DialogueKind::Legacy);
                assert_eq!(first.bytes, b"a");
                assert_eq!(second.bytes, b"b");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(table.get(1).map(|s| s.stage), Some(Stage::Rendering));
        assert_eq!(table.accept_photo(1, 10, photo("c")), PhotoOutcome::Ignored);
        assert!(table.finish(1).is_some());
        assert!(table.is_empty());
    }

    #[test]
    fn other_users_cannot_take_over_or_feed_photos() {
        let mut table = SessionTable::new();
        table.start(1, 10, DialogueKind::OneShot);
        assert_eq!(
            table.start(1, 20, DialogueKind::Legacy),
            StartOutcome::Busy { owner: 10 }
        );
        assert_eq!(table.accept_photo(1, 20, photo("x")), PhotoOutcome::Ignored);
        assert_eq!(table.awaiting_photo(1, 20), None);
        assert_eq!(
            table.awaiting_photo(1, 10),
            Some((DialogueKind::OneShot, Stage::AwaitFirst))
        );
        assert_eq!(table.get(1).map(|s| s.kind), Some(DialogueKind::OneShot));
    }

    #[test]
    fn owner_restart_resets_progress() {
        let mut table = SessionTable::new();
        table.start(1, 10, DialogueKind::Legacy);
        table.accept_photo(1, 10, photo("a"));
        assert_eq!(table.start(1, 10, DialogueKind::OneShot), StartOutcome::Started);
        let session = table.get(1).cloned();
        assert_eq!(session.as_ref().map(|s| s.stage), Some(Stage::AwaitFirst));
        assert_eq!(session.and_then(|s| s.first), None);
    }

    #[test]
    fn cancel_is_owner_only() {
        let mut table = SessionTable::new();
        assert_eq!(table.cancel(1, 10), CancelOutcome::NoSession);
        table.start(1, 10, DialogueKind::Legacy);
        assert_eq!(table.cancel(1, 20), CancelOutcome::NotOwner);
        assert_eq!(table.cancel(1, 10), CancelOutcome::Cancelled(DialogueKind::Legacy));
        assert!(table.get(1).is_none());
    }

    #[test]
    fn sessions_are_per_chat() {
        let mut table = SessionTable::new();
        table.start(1, 10, DialogueKind::Legacy);
        table.start(2, 20, DialogueKind::OneShot);
        assert_eq!(table.len(), 2);
        assert_eq!(table.accept_photo(2, 10, photo("a")), PhotoOutcome::Ignored);
    }

    #[test]
    fn photo_suffix_comes_from_the_file_path() {
        assert_eq!(photo("a").suffix(), ".jpg");
        let png = PhotoInput {
            file_path: "photos/file_7.PNG".to_string(),
            ..photo("a")
        };
        assert_eq!(png.suffix(), ".png");
        let bare = PhotoInput {
            file_path: "photos/file".to_string(),
            ..photo("a")
        };
        assert_eq!(bare.suffix(), ".jpg");
    }
}
