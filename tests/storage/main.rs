//! Integration tests for Layer 1: Storage
//!
//! Tests for tables with stable column identity and the table catalog.

mod catalog;
mod tables;
