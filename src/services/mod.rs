pub mod account_service;
pub mod loan_service;
