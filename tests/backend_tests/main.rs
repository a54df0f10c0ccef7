//! Tests for sorted run files and the local backend
