//! Herring QC Core Library
//!
//! Quality-control rule engine for herring port, sea, lab and otolith
//! samples. Front ends supply a [`core::qc::QcModel`] for form access and a
//! [`core::qc::Prompter`] for confirmations.

pub mod core;
