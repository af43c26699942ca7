//! Request and response bodies for the HTTP API.

pub mod analytics;
pub mod invoices;
pub mod labels;
pub mod receivers;

pub use analytics::PeriodQuery;
pub use invoices::{
    CreateInvoiceRequest, CreateItemRequest, InvoiceResponse, RecalculateResponse,
    UpdateItemRequest, UpdateStatusRequest,
};
pub use labels::CreateLabelRequest;
pub use receivers::{CreateReceiverRequest, MergeReceiversRequest};
