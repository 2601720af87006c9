//! Domain models for billcraft-api.

mod client;
mod invoice;
mod line_item;
mod plan;
mod subscriber;
mod totals;

pub use client::{Client, CreateClient, UpdateClient};
pub use invoice::{CreateInvoice, Invoice, InvoiceStatus, ListInvoicesFilter, UpdateInvoice};
pub use line_item::{CreateInvoiceItem, InvoiceItem};
pub use plan::{Feature, Plan, PlanLimits, SubscriptionTier, UNLIMITED};
pub use subscriber::{Subscriber, SubscriptionState};
pub use totals::InvoiceTotals;
