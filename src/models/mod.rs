pub mod account;
pub mod booking;
pub mod catalog;
pub mod finance;
pub mod inventory;

pub use account::{
    Account, AccountResponse, AvailabilityWindow, ContactMethod, CustomerProfile, CustomerRole,
    Role, StaffProfile, StaffRole, WeeklyAvailability,
};
pub use booking::{Booking, BookingPart, BookingStatus, BookingView, PartRequest};
pub use catalog::{
    CategoryView, DetailedService, DetailedServiceView, PricedService, Service, ServiceCategory,
    ServicePartRequired, ServicePartRequiredView,
};
pub use finance::{
    Billable, BillableKind, FinancialSummary, FinancialSummaryView, LedgerError,
    PaymentMethod, PaymentRecord, PaymentStatus, SummaryEntry, Transaction, TransactionRow,
    TransactionType, TransactionView,
};
pub use inventory::{
    Device, DevicePart, DevicePartView, DeviceType, MovementType, PartMovement, PartStatus,
    RepairHistory, RepairStatus, SaleStatus, StockError, StockStatus,
};
