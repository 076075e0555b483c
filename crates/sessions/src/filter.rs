use chrono::{DateTime, Utc};

use agentsdk_domain::message::Role;

/// Selects a subset of a transcript for `Session::list`.
///
/// Role and the time window are applied first (in append order), then
/// `offset` entries are skipped, then up to `limit` are kept. `limit == 0`
/// means unbounded.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub role: Option<Role>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub offset: usize,
    pub limit: usize,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_window(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start_time = Some(start);
        self.end_time = Some(end);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    fn matches(&self, msg: &agentsdk_domain::message::Message) -> bool {
        if let Some(role) = self.role {
            if msg.role != role {
                return false;
            }
        }
        if let Some(start) = self.start_time {
            if msg.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end_time {
            if msg.timestamp > end {
                return false;
            }
        }
        true
    }

    pub fn apply(&self, messages: &[agentsdk_domain::message::Message]) -> Vec<agentsdk_domain::message::Message> {
        let matched = messages.iter().filter(|m| self.matches(m));
        let skipped = matched.skip(self.offset);
        if self.limit == 0 {
            skipped.cloned().collect()
        } else {
            skipped.take(self.limit).cloned().collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentsdk_domain::message::Message;

    fn msgs() -> Vec<Message> {
        (0..5).map(|i| Message::user(format!("m{i}"))).collect()
    }

    #[test]
    fn offset_then_limit() {
        let f = Filter::new().with_offset(1).with_limit(2);
        let out = f.apply(&msgs());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].content, "m1");
        assert_eq!(out[1].content, "m2");
    }

    #[test]
    fn zero_limit_is_unbounded() {
        let f = Filter::new().with_offset(2);
        let out = f.apply(&msgs());
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn role_filter_excludes_other_roles() {
        use agentsdk_domain::message::Role;
        let mut all = msgs();
        all.push(Message::assistant("reply"));
        let f = Filter::new().with_role(Role::Assistant);
        let out = f.apply(&all);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].content, "reply");
    }
}
