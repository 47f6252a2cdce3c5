//! Small pure helpers shared by the API objects and the storage layer: reference minting,
//! token and OTP digests, password hashing and contact masking. Everything here is
//! deterministic or purely random, with no database access, which keeps it trivially testable.

pub mod masking;
pub mod otp;
pub mod passwords;
pub mod references;
pub mod tokens;
