// Client-side ids for optimistic sends.

/// Hands out temporary ids of the form `tmp-<session>-<seq>`.
///
/// The session prefix is random per app launch, so ids never collide with
/// leftovers from a previous launch that the backend may still echo back.
pub(crate) struct TemporaryIdAllocator {
    session: String,
    seq: u64,
}

impl TemporaryIdAllocator {
    pub(crate) fn new() -> Self {
        let session = uuid::Uuid::new_v4().simple().to_string();
        Self::with_session(&session[..12])
    }

    pub(crate) fn with_session(session: &str) -> Self {
        Self {
            session: session.to_string(),
            seq: 0,
        }
    }

    pub(crate) fn next_id(&mut self) -> String {
        self.seq += 1;
        format!("tmp-{}-{}", self.session, self.seq)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::TemporaryIdAllocator;

    #[test]
    fn ids_are_unique_and_ordered() {
        let mut alloc = TemporaryIdAllocator::with_session("abc");
        assert_eq!(alloc.next_id(), "tmp-abc-1");
        assert_eq!(alloc.next_id(), "tmp-abc-2");

        let ids: HashSet<String> = (0..1_000).map(|_| alloc.next_id()).collect();
        assert_eq!(ids.len(), 1_000);
    }

    #[test]
    fn separate_launches_do_not_collide() {
        let mut a = TemporaryIdAllocator::new();
        let mut b = TemporaryIdAllocator::new();
        assert_ne!(a.next_id(), b.next_id());
        assert!(a.next_id().starts_with("tmp-"));
    }
}
