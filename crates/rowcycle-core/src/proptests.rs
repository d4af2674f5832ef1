//! Property-based tests for the row-cyclic partitioner.
