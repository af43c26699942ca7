//! Domain models for bookkeeping-service.

mod analytics;
mod invoice;
mod label;
mod line_item;
mod receiver;

pub use analytics::{
    GroupDimension, GroupItem, GroupReport, GroupTotalsRow, Period, ReportWindow,
    StatusTotalsRow, SummaryReport, TrendGranularity, TrendPoint, TrendReport, TrendRow,
    UNCATEGORIZED_NAME,
};
pub use invoice::{CreateInvoice, Invoice, InvoiceStatus, InvoiceTotals};
pub use label::{Category, Company, CreateLabel, Tag};
pub use line_item::{
    CreateInvoiceItem, InvoiceItem, ItemAmounts, NewInvoiceItem, TargetAmountIntent,
    UpdateInvoiceItem,
};
pub use receiver::{CreateReceiver, InvoiceReceiver, MergeOutcome, MergeReceivers};
