use std::io::Write;
use std::time::SystemTime;

use uuid::Uuid;

use crate::constants::SDK_INFO;
use crate::dsn::Dsn;
use crate::protocol::{Attachment, Event, MonitorCheckIn, Transaction};
use crate::session::Session;
use crate::utils::to_rfc3339;

/// A single typed payload inside an [`Envelope`].
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum EnvelopeItem {
    /// An event item.
    Event(Event<'static>),
    /// A transaction item.
    Transaction(Transaction<'static>),
    /// A session update item.
    Session(Session),
    /// An attachment item.
    Attachment(Attachment),
    /// A monitor check-in item.
    MonitorCheckIn(MonitorCheckIn),
}

impl From<Event<'static>> for EnvelopeItem {
    fn from(event: Event<'static>) -> Self {
        EnvelopeItem::Event(event)
    }
}

impl From<Transaction<'static>> for EnvelopeItem {
    fn from(transaction: Transaction<'static>) -> Self {
        EnvelopeItem::Transaction(transaction)
    }
}

impl From<Session> for EnvelopeItem {
    fn from(session: Session) -> Self {
        EnvelopeItem::Session(session)
    }
}

impl From<Attachment> for EnvelopeItem {
    fn from(attachment: Attachment) -> Self {
        EnvelopeItem::Attachment(attachment)
    }
}

impl From<MonitorCheckIn> for EnvelopeItem {
    fn from(check_in: MonitorCheckIn) -> Self {
        EnvelopeItem::MonitorCheckIn(check_in)
    }
}

/// An envelope, the newline-delimited container frame of the wire format.
///
/// An envelope consists of a JSON header line followed by one or more item
/// frames, each of which is a JSON item header line and the item's payload
/// bytes. Related items, such as an event and its attachments, travel in one
/// envelope; sessions and check-ins are independent items.
#[derive(Clone, Default, Debug)]
pub struct Envelope {
    event_id: Option<Uuid>,
    dsn: Option<Dsn>,
    items: Vec<EnvelopeItem>,
}

impl Envelope {
    /// Creates a new empty Envelope.
    pub fn new() -> Envelope {
        Default::default()
    }

    /// Add a new Envelope Item.
    pub fn add_item<I>(&mut self, item: I)
    where
        I: Into<EnvelopeItem>,
    {
        let item = item.into();
        if self.event_id.is_none() {
            if let EnvelopeItem::Event(ref event) = item {
                self.event_id = Some(event.event_id);
            } else if let EnvelopeItem::Transaction(ref transaction) = item {
                self.event_id = Some(transaction.event_id);
            }
        }
        self.items.push(item);
    }

    /// Creates an iterator over all the items.
    pub fn items(&self) -> impl Iterator<Item = &EnvelopeItem> {
        self.items.iter()
    }

    /// Returns the Envelope's Uuid, if any.
    pub fn uuid(&self) -> Option<&Uuid> {
        self.event_id.as_ref()
    }

    /// Returns the [`Event`] contained in this Envelope, if any.
    pub fn event(&self) -> Option<&Event<'static>> {
        self.items.iter().find_map(|item| match item {
            EnvelopeItem::Event(event) => Some(event),
            _ => None,
        })
    }

    /// Sets the descriptor recorded in the envelope header.
    pub fn set_dsn(&mut self, dsn: Option<Dsn>) {
        self.dsn = dsn;
    }

    /// Filters the Envelope's items based on a predicate, returning a new
    /// Envelope containing only the retained items.
    ///
    /// Attachments are additionally dropped when no event or transaction
    /// remains to attach them to. [`None`] is returned if nothing remains.
    pub fn filter<P>(self, mut predicate: P) -> Option<Self>
    where
        P: FnMut(&EnvelopeItem) -> bool,
    {
        let mut filtered = Envelope {
            dsn: self.dsn,
            ..Envelope::new()
        };
        for item in self.items {
            if predicate(&item) {
                filtered.add_item(item);
            }
        }

        if filtered.uuid().is_none() {
            filtered
                .items
                .retain(|item| !matches!(item, EnvelopeItem::Attachment(..)));
        }

        if filtered.items.is_empty() {
            None
        } else {
            Some(filtered)
        }
    }

    /// Serialize the Envelope into the given [`Write`].
    ///
    /// [`Write`]: https://doc.rust-lang.org/std/io/trait.Write.html
    pub fn to_writer<W>(&self, mut writer: W) -> std::io::Result<()>
    where
        W: Write,
    {
        // write the headers:
        write!(writer, "{{")?;
        if let Some(ref event_id) = self.event_id {
            write!(writer, r#""event_id":"{}","#, event_id.as_simple())?;
        }
        if let Some(ref dsn) = self.dsn {
            write!(writer, r#""dsn":"{dsn}","#)?;
        }
        writeln!(
            writer,
            r#""sent_at":"{}","sdk":{{"name":"{}","version":"{}"}}}}"#,
            to_rfc3339(&SystemTime::now()),
            SDK_INFO.name,
            SDK_INFO.version
        )?;

        let mut item_buf = Vec::new();
        // write each item, newline separated; the final frame ends exactly at
        // its last payload byte
        for (idx, item) in self.items.iter().enumerate() {
            match item {
                EnvelopeItem::Attachment(attachment) => {
                    attachment.to_writer(&mut writer)?;
                }
                other => {
                    // serialize to a temporary buffer first to learn the length
                    match other {
                        EnvelopeItem::Event(event) => serde_json::to_writer(&mut item_buf, event)?,
                        EnvelopeItem::Transaction(transaction) => {
                            serde_json::to_writer(&mut item_buf, transaction)?
                        }
                        EnvelopeItem::Session(session) => {
                            serde_json::to_writer(&mut item_buf, session)?
                        }
                        EnvelopeItem::MonitorCheckIn(check_in) => {
                            serde_json::to_writer(&mut item_buf, check_in)?
                        }
                        EnvelopeItem::Attachment(_) => unreachable!(),
                    }
                    let item_type = match other {
                        EnvelopeItem::Event(_) => "event",
                        EnvelopeItem::Transaction(_) => "transaction",
                        EnvelopeItem::Session(_) => "session",
                        EnvelopeItem::MonitorCheckIn(_) => "check_in",
                        EnvelopeItem::Attachment(_) => unreachable!(),
                    };
                    writeln!(
                        writer,
                        r#"{{"type":"{}","length":{}}}"#,
                        item_type,
                        item_buf.len()
                    )?;
                    writer.write_all(&item_buf)?;
                    item_buf.clear();
                }
            }
            if idx + 1 < self.items.len() {
                writeln!(writer)?;
            }
        }

        Ok(())
    }

    /// Serializes the Envelope into a byte buffer.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut vec = Vec::new();
        self.to_writer(&mut vec).expect("writing to a Vec never fails");
        vec
    }
}

impl<T> From<T> for Envelope
where
    T: Into<EnvelopeItem>,
{
    fn from(item: T) -> Self {
        let mut envelope = Self::default();
        envelope.add_item(item.into());
        envelope
    }
}
