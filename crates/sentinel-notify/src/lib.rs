pub mod dispatcher;
pub mod message;
pub mod notifier;
pub mod providers;

pub use dispatcher::{AlertLookup, DeliveryRecord, DispatchReport, NotificationDispatcher};
pub use message::NotifyMessage;
pub use notifier::{Notifier, NotifyResult};
pub use providers::{
    default_notifiers, ChatNotifier, EmailNotifier, PagerNotifier, SmsNotifier, WebhookNotifier,
};
