use std::time::{Duration, SystemTime};

use httpdate::parse_http_date;

use crate::{Envelope, EnvelopeItem};

/// The category of payload that a rate limit refers to.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitingCategory {
    /// Rate limit for any kind of payload.
    Any,
    /// Rate limit pertaining to errors.
    Error,
    /// Rate limit pertaining to sessions.
    Session,
    /// Rate limit pertaining to transactions.
    Transaction,
    /// Rate limit pertaining to attachments.
    Attachment,
    /// Rate limit pertaining to monitor check-ins.
    CheckIn,
}

impl RateLimitingCategory {
    fn for_item(item: &EnvelopeItem) -> Self {
        match item {
            EnvelopeItem::Event(_) => Self::Error,
            EnvelopeItem::Transaction(_) => Self::Transaction,
            EnvelopeItem::Session(_) => Self::Session,
            EnvelopeItem::Attachment(_) => Self::Attachment,
            EnvelopeItem::MonitorCheckIn(_) => Self::CheckIn,
        }
    }
}

/// A ledger of per-category rate limits issued by the server.
#[derive(Debug, Default)]
pub struct RateLimiter {
    global: Option<SystemTime>,
    error: Option<SystemTime>,
    session: Option<SystemTime>,
    transaction: Option<SystemTime>,
    attachment: Option<SystemTime>,
    check_in: Option<SystemTime>,
}

impl RateLimiter {
    /// Creates a new RateLimiter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates the RateLimiter with information from a `Retry-After` header.
    pub fn update_from_retry_after(&mut self, header: &str) {
        let new_time = if let Ok(value) = header.parse::<f64>() {
            Some(SystemTime::now() + Duration::from_secs(value.ceil() as u64))
        } else if let Ok(value) = parse_http_date(header) {
            Some(value)
        } else {
            None
        };

        if new_time.is_some() {
            self.global = new_time;
        }
    }

    /// Updates the RateLimiter from a plain `429` without explicit headers.
    pub fn update_from_429(&mut self) {
        self.global = Some(SystemTime::now() + Duration::from_secs(60));
    }

    /// Updates the RateLimiter with information from an `X-Sentry-Rate-Limits` header.
    pub fn update_from_sentry_header(&mut self, header: &str) {
        // <rate-limit> = (<group>,)+
        // <group> = <time>:(<category>;)+:<scope>(:<reason>)?

        let mut parse_group = |group: &str| {
            let mut splits = group.split(':');
            let seconds = splits.next()?.parse::<f64>().ok()?;
            let categories = splits.next()?;
            let _scope = splits.next()?;

            let new_time = Some(SystemTime::now() + Duration::from_secs(seconds.ceil() as u64));

            if categories.is_empty() {
                self.global = new_time;
            }

            for category in categories.split(';') {
                match category {
                    "any" => self.global = new_time,
                    "error" => self.error = new_time,
                    "session" => self.session = new_time,
                    "transaction" => self.transaction = new_time,
                    "attachment" => self.attachment = new_time,
                    "check_in" | "monitor" => self.check_in = new_time,
                    _ => {}
                }
            }
            Some(())
        };

        for group in header.split(',') {
            parse_group(group.trim());
        }
    }

    /// Query the RateLimiter for a certain category of item.
    ///
    /// Returns the remaining block duration if the category may not be sent.
    pub fn is_disabled(&self, category: RateLimitingCategory) -> Option<Duration> {
        if let Some(ts) = self.global {
            let time_left = ts.duration_since(SystemTime::now()).ok();
            if time_left.is_some() {
                return time_left;
            }
        }
        let time_left = match category {
            RateLimitingCategory::Any => self.global,
            RateLimitingCategory::Error => self.error,
            RateLimitingCategory::Session => self.session,
            RateLimitingCategory::Transaction => self.transaction,
            RateLimitingCategory::Attachment => self.attachment,
            RateLimitingCategory::CheckIn => self.check_in,
        }?;
        time_left.duration_since(SystemTime::now()).ok()
    }

    /// Answers whether an item of the given category may be sent right now.
    pub fn may_send(&self, category: RateLimitingCategory) -> bool {
        self.is_disabled(category).is_none()
    }

    /// Filters an [`Envelope`] according to the current rate limits,
    /// dropping every item of a blocked category.
    pub fn filter_envelope(&self, envelope: Envelope) -> Option<Envelope> {
        envelope.filter(|item| self.may_send(RateLimitingCategory::for_item(item)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentry_header() {
        let mut rl = RateLimiter::new();
        rl.update_from_sentry_header("120:error:project:reason, 60:session:foo");

        assert!(rl.is_disabled(RateLimitingCategory::Error).unwrap() <= Duration::from_secs(120));
        assert!(rl.is_disabled(RateLimitingCategory::Session).unwrap() <= Duration::from_secs(60));
        assert!(rl.is_disabled(RateLimitingCategory::Transaction).is_none());
        assert!(rl.is_disabled(RateLimitingCategory::Any).is_none());
        assert!(rl.may_send(RateLimitingCategory::CheckIn));

        rl.update_from_sentry_header(
            r#"
                30::bar,
                120:invalid:invalid,
                4711:foo;bar;baz;security:project
            "#,
        );

        assert!(
            rl.is_disabled(RateLimitingCategory::Transaction).unwrap() <= Duration::from_secs(30)
        );
        assert!(rl.is_disabled(RateLimitingCategory::Any).unwrap() <= Duration::from_secs(30));
    }

    #[test]
    fn test_category_directives() {
        let mut rl = RateLimiter::new();
        rl.update_from_sentry_header("60:attachment;check_in:organization");

        assert!(!rl.may_send(RateLimitingCategory::Attachment));
        assert!(!rl.may_send(RateLimitingCategory::CheckIn));
        assert!(rl.may_send(RateLimitingCategory::Error));

        let mut rl = RateLimiter::new();
        rl.update_from_sentry_header("60:any:organization");
        assert!(!rl.may_send(RateLimitingCategory::Error));
        assert!(!rl.may_send(RateLimitingCategory::Any));
    }

    #[test]
    fn test_retry_after() {
        let mut rl = RateLimiter::new();
        rl.update_from_retry_after("60");

        assert!(rl.is_disabled(RateLimitingCategory::Error).unwrap() <= Duration::from_secs(60));
        assert!(rl.is_disabled(RateLimitingCategory::Session).unwrap() <= Duration::from_secs(60));
        assert!(
            rl.is_disabled(RateLimitingCategory::Transaction).unwrap() <= Duration::from_secs(60)
        );
        assert!(rl.is_disabled(RateLimitingCategory::Any).unwrap() <= Duration::from_secs(60));
    }

    #[test]
    fn test_retry_after_http_date() {
        let mut rl = RateLimiter::new();
        rl.update_from_retry_after("Fri, 30 Nov 2100 00:00:00 GMT");
        assert!(rl.is_disabled(RateLimitingCategory::Any).is_some());
    }

    #[test]
    fn test_filter_envelope() {
        let mut rl = RateLimiter::new();
        rl.update_from_sentry_header("60:error:project");

        let mut envelope = Envelope::new();
        envelope.add_item(crate::protocol::Event::default());
        assert!(rl.filter_envelope(envelope).is_none());

        let mut envelope = Envelope::new();
        envelope.add_item(crate::protocol::MonitorCheckIn {
            check_in_id: uuid::Uuid::new_v4(),
            monitor_slug: "cron".into(),
            status: crate::protocol::MonitorCheckInStatus::Ok,
            environment: None,
            duration: None,
        });
        assert!(rl.filter_envelope(envelope).is_some());
    }
}
