//! Fixtures shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::auth::{Identity, Role};
use crate::models::message::{Message, NewMessage};
use crate::models::tutoring::{Enrollment, EnrollmentStatus, Participant, SessionInfo};
use crate::store::{DirectPeer, InMemoryMessageStore, MessageStore, StoreError};
use crate::tutoring_client::{DirectoryError, TutoringDirectory};

pub fn tutor(id: &str) -> Participant {
    Participant::new(id, format!("Tutor {}", id), Role::Tutor)
}

pub fn student(id: &str) -> Participant {
    Participant::new(id, format!("Student {}", id), Role::Student)
}

pub fn identity_of(participant: &Participant) -> Identity {
    Identity::new(&participant.id, &participant.name, participant.role)
}

#[derive(Default)]
struct DirectoryState {
    sessions: HashMap<String, SessionInfo>,
    enrollments: Vec<Enrollment>,
    users: HashMap<String, Participant>,
}

/// Tutoring service stand-in with switchable failure modes.
#[derive(Default)]
pub struct InMemoryDirectory {
    state: Mutex<DirectoryState>,
    unavailable: AtomicBool,
    delay_ms: AtomicUsize,
    broken_sessions: Mutex<Vec<String>>,
}

impl InMemoryDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_session(&self, id: &str, title: &str, tutor: &Participant) {
        let mut state = self.state.lock().unwrap();
        state.sessions.insert(
            id.to_string(),
            SessionInfo {
                id: id.to_string(),
                title: title.to_string(),
                subject_name: format!("Subject of {}", title),
                tutor_id: tutor.id.clone(),
                tutor_name: tutor.name.clone(),
            },
        );
        state.users.insert(tutor.id.clone(), tutor.clone());
    }

    pub fn remove_session(&self, id: &str) {
        self.state.lock().unwrap().sessions.remove(id);
    }

    pub fn enroll(&self, session_id: &str, student: &Participant, status: EnrollmentStatus) {
        let mut state = self.state.lock().unwrap();
        state
            .enrollments
            .retain(|e| !(e.session_id == session_id && e.student_id == student.id));
        state.enrollments.push(Enrollment {
            session_id: session_id.to_string(),
            student_id: student.id.clone(),
            student_name: student.name.clone(),
            status,
        });
        state.users.insert(student.id.clone(), student.clone());
    }

    pub fn add_user(&self, user: &Participant) {
        self.state.lock().unwrap().users.insert(user.id.clone(), user.clone());
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as usize, Ordering::SeqCst);
    }

    /// Session metadata lookups for `id` fail with a server error.
    pub fn break_session(&self, id: &str) {
        self.broken_sessions.lock().unwrap().push(id.to_string());
    }

    async fn simulate(&self, path: &str) -> Result<(), DirectoryError> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DirectoryError::Status {
                status: 503,
                path: path.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl TutoringDirectory for InMemoryDirectory {
    async fn session(&self, session_id: &str) -> Result<Option<SessionInfo>, DirectoryError> {
        self.simulate("/tutorias").await?;
        if self.broken_sessions.lock().unwrap().iter().any(|id| id == session_id) {
            return Err(DirectoryError::Status {
                status: 500,
                path: format!("/tutorias/{}", session_id),
            });
        }
        Ok(self.state.lock().unwrap().sessions.get(session_id).cloned())
    }

    async fn enrollments(&self, session_id: &str) -> Result<Vec<Enrollment>, DirectoryError> {
        self.simulate("/tutorias/solicitudes").await?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .enrollments
            .iter()
            .filter(|e| e.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn sessions_taught_by(&self, tutor_id: &str) -> Result<Vec<SessionInfo>, DirectoryError> {
        self.simulate("/tutorias/tutor").await?;
        let mut sessions: Vec<SessionInfo> = self
            .state
            .lock()
            .unwrap()
            .sessions
            .values()
            .filter(|s| s.tutor_id == tutor_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(sessions)
    }

    async fn enrollments_of(&self, student_id: &str) -> Result<Vec<Enrollment>, DirectoryError> {
        self.simulate("/solicitudes/estudiante").await?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .enrollments
            .iter()
            .filter(|e| e.student_id == student_id)
            .cloned()
            .collect())
    }

    async fn user(&self, user_id: &str) -> Result<Option<Participant>, DirectoryError> {
        self.simulate("/usuarios").await?;
        Ok(self.state.lock().unwrap().users.get(user_id).cloned())
    }
}

/// In-memory store whose appends start failing after a number of successes.
pub struct FlakyStore {
    inner: InMemoryMessageStore,
    appends_left: AtomicUsize,
}

impl FlakyStore {
    pub fn failing_after(appends: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryMessageStore::new(),
            appends_left: AtomicUsize::new(appends),
        })
    }

    pub async fn len(&self) -> usize {
        self.inner.len().await
    }
}

#[async_trait]
impl MessageStore for FlakyStore {
    async fn append(&self, message: NewMessage) -> Result<Message, StoreError> {
        let left = self.appends_left.load(Ordering::SeqCst);
        if left == 0 {
            return Err(StoreError::Unavailable("simulated write failure".to_string()));
        }
        self.appends_left.store(left - 1, Ordering::SeqCst);
        self.inner.append(message).await
    }

    async fn history(&self, session_id: &str, limit: usize) -> Result<Vec<Message>, StoreError> {
        self.inner.history(session_id, limit).await
    }

    async fn mark_read(&self, session_id: &str, recipient_id: &str) -> Result<u64, StoreError> {
        self.inner.mark_read(session_id, recipient_id).await
    }

    async fn count_unread(&self, recipient_id: &str) -> Result<i64, StoreError> {
        self.inner.count_unread(recipient_id).await
    }

    async fn count_unread_in_session(
        &self,
        session_id: &str,
        recipient_id: &str,
    ) -> Result<i64, StoreError> {
        self.inner.count_unread_in_session(session_id, recipient_id).await
    }

    async fn last_message(&self, session_id: &str) -> Result<Option<Message>, StoreError> {
        self.inner.last_message(session_id).await
    }

    async fn direct_history(
        &self,
        user_id: &str,
        peer_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        self.inner.direct_history(user_id, peer_id, limit).await
    }

    async fn mark_direct_read(&self, sender_id: &str, recipient_id: &str) -> Result<u64, StoreError> {
        self.inner.mark_direct_read(sender_id, recipient_id).await
    }

    async fn direct_peers(&self, user_id: &str) -> Result<Vec<DirectPeer>, StoreError> {
        self.inner.direct_peers(user_id).await
    }

    async fn count_unread_from(&self, sender_id: &str, recipient_id: &str) -> Result<i64, StoreError> {
        self.inner.count_unread_from(sender_id, recipient_id).await
    }

    async fn mark_message_read(
        &self,
        id: Uuid,
        recipient_id: &str,
    ) -> Result<Option<Message>, StoreError> {
        self.inner.mark_message_read(id, recipient_id).await
    }

    async fn healthy(&self) -> bool {
        false
    }
}
