//! Who may take part in a session's chat, and who receives a send.
//!
//! Membership is derived on every call from the tutoring service: the
//! session's tutor plus every student with an accepted enrollment. Nothing is
//! cached, so a revoked enrollment takes effect on the next operation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ChatError;
use crate::models::auth::{Identity, Role};
use crate::models::tutoring::{Participant, SessionInfo};
use crate::tutoring_client::{DirectoryError, TutoringDirectory};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authorization {
    pub is_tutor: bool,
    pub is_accepted_student: bool,
}

impl Authorization {
    pub fn is_authorized(&self) -> bool {
        self.is_tutor || self.is_accepted_student
    }
}

/// Legitimate participants of one session.
#[derive(Debug, Clone, PartialEq)]
pub struct Roster {
    pub session: SessionInfo,
    pub tutor: Participant,
    pub students: Vec<Participant>,
}

impl Roster {
    pub fn authorization_of(&self, user_id: &str) -> Authorization {
        Authorization {
            is_tutor: self.tutor.id == user_id,
            is_accepted_student: self.students.iter().any(|s| s.id == user_id),
        }
    }

    /// Tutor sends reach every accepted student; student sends reach the
    /// tutor and the other accepted students. Never the sender.
    pub fn fanout_for(&self, sender_id: &str) -> Vec<Participant> {
        let auth = self.authorization_of(sender_id);
        let mut recipients = Vec::with_capacity(self.students.len() + 1);
        if !auth.is_tutor {
            recipients.push(self.tutor.clone());
        }
        recipients.extend(self.students.iter().filter(|s| s.id != sender_id).cloned());
        recipients
    }
}

#[derive(Clone)]
pub struct MembershipResolver {
    directory: Arc<dyn TutoringDirectory>,
    timeout: Duration,
}

impl MembershipResolver {
    pub fn new(directory: Arc<dyn TutoringDirectory>, timeout: Duration) -> Self {
        Self { directory, timeout }
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, ChatError>
    where
        F: Future<Output = Result<T, DirectoryError>>,
    {
        Ok(tokio::time::timeout(self.timeout, call).await??)
    }

    pub async fn roster(&self, session_id: &str) -> Result<Roster, ChatError> {
        let (session, enrollments) = tokio::try_join!(
            self.bounded(self.directory.session(session_id)),
            self.bounded(self.directory.enrollments(session_id)),
        )?;
        let session = session.ok_or_else(|| ChatError::NotFound("session".to_string()))?;

        let tutor_name = if session.tutor_name.is_empty() {
            self.display_name_of(&session.tutor_id).await
        } else {
            session.tutor_name.clone()
        };
        let tutor = Participant::new(&session.tutor_id, tutor_name, Role::Tutor);

        let mut students: Vec<Participant> = Vec::new();
        for enrollment in enrollments.into_iter().filter(|e| e.is_accepted()) {
            if enrollment.student_id == tutor.id || students.iter().any(|s| s.id == enrollment.student_id) {
                continue;
            }
            let name = if enrollment.student_name.is_empty() {
                enrollment.student_id.clone()
            } else {
                enrollment.student_name
            };
            students.push(Participant::new(enrollment.student_id, name, Role::Student));
        }

        Ok(Roster {
            session,
            tutor,
            students,
        })
    }

    // Falls back to the id when the directory has no usable name.
    async fn display_name_of(&self, user_id: &str) -> String {
        match self.user(user_id).await {
            Ok(Some(user)) if !user.name.is_empty() => user.name,
            Ok(_) => user_id.to_string(),
            Err(err) => {
                tracing::warn!(user_id, error = %err, "could not resolve display name");
                user_id.to_string()
            }
        }
    }

    pub async fn authorize(&self, session_id: &str, caller: &Identity) -> Result<Authorization, ChatError> {
        let roster = self.roster(session_id).await?;
        let auth = roster.authorization_of(&caller.user_id);
        if auth.is_tutor && caller.role != Role::Tutor {
            tracing::debug!(
                user_id = %caller.user_id,
                role = %caller.role,
                session_id,
                "session tutor connected with a non-tutor role"
            );
        }
        Ok(auth)
    }

    /// The roster, or `Authorization` if the caller is not part of it.
    pub async fn require_participant(&self, session_id: &str, caller: &Identity) -> Result<Roster, ChatError> {
        let roster = self.roster(session_id).await?;
        if !roster.authorization_of(&caller.user_id).is_authorized() {
            tracing::info!(user_id = %caller.user_id, session_id, "denied access to session chat");
            return Err(ChatError::Authorization);
        }
        Ok(roster)
    }

    pub async fn resolve_fanout_set(&self, session_id: &str, sender: &Identity) -> Result<Vec<Participant>, ChatError> {
        let roster = self.require_participant(session_id, sender).await?;
        Ok(roster.fanout_for(&sender.user_id))
    }

    /// Sessions whose chat the user takes part in.
    pub async fn sessions_for(&self, user: &Identity) -> Result<Vec<String>, ChatError> {
        let mut ids: Vec<String> = match user.role {
            Role::Tutor => self
                .bounded(self.directory.sessions_taught_by(&user.user_id))
                .await?
                .into_iter()
                .map(|s| s.id)
                .collect(),
            Role::Student => self
                .bounded(self.directory.enrollments_of(&user.user_id))
                .await?
                .into_iter()
                .filter(|e| e.is_accepted())
                .map(|e| e.session_id)
                .collect(),
            Role::Admin => Vec::new(),
        };
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    pub async fn session_info(&self, session_id: &str) -> Result<Option<SessionInfo>, ChatError> {
        self.bounded(self.directory.session(session_id)).await
    }

    pub async fn user(&self, user_id: &str) -> Result<Option<Participant>, ChatError> {
        self.bounded(self.directory.user(user_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tutoring::EnrollmentStatus;
    use crate::testing::{identity_of, student, tutor, InMemoryDirectory};

    fn resolver(directory: Arc<InMemoryDirectory>) -> MembershipResolver {
        MembershipResolver::new(directory, Duration::from_millis(200))
    }

    fn seeded() -> Arc<InMemoryDirectory> {
        let directory = InMemoryDirectory::new();
        directory.add_session("s", "Limits", &tutor("t"));
        directory.enroll("s", &student("a"), EnrollmentStatus::Accepted);
        directory.enroll("s", &student("b"), EnrollmentStatus::Pending);
        directory.enroll("s", &student("c"), EnrollmentStatus::Accepted);
        directory
    }

    #[tokio::test]
    async fn test_authorize() {
        let resolver = resolver(seeded());

        let t = resolver.authorize("s", &identity_of(&tutor("t"))).await.unwrap();
        assert!(t.is_tutor && !t.is_accepted_student);

        let a = resolver.authorize("s", &identity_of(&student("a"))).await.unwrap();
        assert!(a.is_accepted_student && a.is_authorized());

        let b = resolver.authorize("s", &identity_of(&student("b"))).await.unwrap();
        assert!(!b.is_authorized());

        assert!(matches!(
            resolver.require_participant("s", &identity_of(&student("b"))).await,
            Err(ChatError::Authorization)
        ));
        assert!(matches!(
            resolver.authorize("missing", &identity_of(&tutor("t"))).await,
            Err(ChatError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_fanout_sets() {
        let resolver = resolver(seeded());

        let from_tutor = resolver.resolve_fanout_set("s", &identity_of(&tutor("t"))).await.unwrap();
        let ids: Vec<&str> = from_tutor.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);

        let from_a = resolver.resolve_fanout_set("s", &identity_of(&student("a"))).await.unwrap();
        let ids: Vec<&str> = from_a.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["t", "c"]);
        assert_eq!(from_a[0].role, Role::Tutor);

        assert!(matches!(
            resolver.resolve_fanout_set("s", &identity_of(&student("b"))).await,
            Err(ChatError::Authorization)
        ));
    }

    #[tokio::test]
    async fn test_missing_tutor_name_is_looked_up() {
        let directory = seeded();
        directory.add_session("s2", "Series", &Participant::new("t2", "", Role::Tutor));
        directory.add_session("s3", "Proofs", &Participant::new("t3", "", Role::Tutor));
        directory.add_user(&tutor("t2"));
        let resolver = resolver(directory);

        let roster = resolver.roster("s2").await.unwrap();
        assert_eq!(roster.tutor.name, "Tutor t2");
        assert_eq!(roster.tutor.role, Role::Tutor);

        // Nobody in the directory has a name for t3.
        assert_eq!(resolver.roster("s3").await.unwrap().tutor.name, "t3");
        assert_eq!(resolver.roster("s").await.unwrap().tutor.name, "Tutor t");
    }

    #[tokio::test]
    async fn test_revoked_enrollment_applies_immediately() {
        let directory = seeded();
        let resolver = resolver(directory.clone());
        let a = identity_of(&student("a"));

        assert!(resolver.authorize("s", &a).await.unwrap().is_authorized());
        directory.enroll("s", &student("a"), EnrollmentStatus::Cancelled);
        assert!(!resolver.authorize("s", &a).await.unwrap().is_authorized());
    }

    #[tokio::test]
    async fn test_sessions_for_roles() {
        let directory = seeded();
        directory.add_session("s2", "Series", &tutor("t"));
        directory.enroll("s2", &student("a"), EnrollmentStatus::Rejected);
        let resolver = resolver(directory);

        assert_eq!(
            resolver.sessions_for(&identity_of(&tutor("t"))).await.unwrap(),
            vec!["s".to_string(), "s2".to_string()]
        );
        assert_eq!(
            resolver.sessions_for(&identity_of(&student("a"))).await.unwrap(),
            vec!["s".to_string()]
        );
        let admin = Identity::new("root", "Root", Role::Admin);
        assert!(resolver.sessions_for(&admin).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_slow_or_failing_directory_is_a_dependency_failure() {
        let directory = seeded();
        let resolver = resolver(directory.clone());

        directory.set_delay(Duration::from_millis(500));
        let err = resolver.roster("s").await.unwrap_err();
        assert!(err.is_retryable());

        directory.set_delay(Duration::ZERO);
        directory.set_unavailable(true);
        assert!(matches!(resolver.roster("s").await, Err(ChatError::Dependency(_))));
    }
}
