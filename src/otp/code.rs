//! Reset code generation.

use anyhow::{Context, Result};
use rand::{rngs::OsRng, RngCore};

/// Number of decimal digits in a reset code.
pub const CODE_LENGTH: usize = 6;

const CODE_SPACE: u32 = 1_000_000;

// Draws at or above this limit are rejected so every code in the space stays
// equally likely, leading zeros included.
const REJECTION_LIMIT: u32 = u32::MAX - (u32::MAX % CODE_SPACE);

/// Create a fresh 6-digit reset code from the OS entropy source.
///
/// # Errors
/// Returns an error if the entropy source fails; without entropy it is not
/// safe to issue a code at all.
pub fn generate_code() -> Result<String> {
    loop {
        let mut bytes = [0u8; 4];
        OsRng
            .try_fill_bytes(&mut bytes)
            .context("failed to read entropy for reset code")?;
        let draw = u32::from_be_bytes(bytes);
        if draw < REJECTION_LIMIT {
            return Ok(format!("{:06}", draw % CODE_SPACE));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::collections::HashSet;

    #[test]
    fn code_is_six_decimal_digits() -> Result<()> {
        for _ in 0..64 {
            let code = generate_code()?;
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.chars().all(|c| c.is_ascii_digit()), "got: {code}");
        }
        Ok(())
    }

    #[test]
    fn code_stays_inside_the_space() -> Result<()> {
        for _ in 0..64 {
            let value: u32 = generate_code()?.parse()?;
            assert!(value < CODE_SPACE);
        }
        Ok(())
    }

    #[test]
    fn codes_vary_across_calls() -> Result<()> {
        let mut seen = HashSet::new();
        for _ in 0..32 {
            seen.insert(generate_code()?);
        }
        assert!(seen.len() > 1, "32 identical draws from the code space");
        Ok(())
    }

    #[test]
    fn rejection_limit_is_a_multiple_of_the_space() {
        assert_eq!(REJECTION_LIMIT % CODE_SPACE, 0);
    }
}
