#![doc = include_str!("../README.md")]

/// This module provides the generic repository contract for storing and
/// retrieving entities.
pub mod repository;

/// This module provides the unit-of-work session traits implemented by
/// persistence engines.
pub mod session;

/// This module provides the registry that maps factory keys to session
/// factories and resolves the current session.
pub mod registry;

/// This module provides a repository implementation backed by the registry's
/// current session.
pub mod session_repository;
