//! Integration tests for Layer 0: Foundation
//!
//! Tests for core types: Value, identifiers, Type, and Error.

mod values;
