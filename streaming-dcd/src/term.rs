//! One hinge-loss objective term and its dual coordinate descent
//! update.
//!
//! A term is `weight * c * max(0, coeffs . x - constant)^p` with
//! `p` 1 or 2.  The weight is looked up from the parent rule on
//! every pass (terms only persist the rule hash), so reweighting a
//! rule between passes needs no term regeneration.  Everything but
//! the Lagrange multiplier is immutable after generation and lives
//! in the fixed page file; the multiplier is the sole volatile
//! field.
//!
//! # Fixed record layout
//!
//! Little-endian, `19 + 8 * size` bytes per term:
//!
//! ```text
//! u8  squared
//! i32 rule hash
//! f32 constant
//! f32 qii
//! f32 c
//! i16 size
//! size * (f32 coefficient, i32 variable index)
//! ```

use std::convert::TryInto;

const EPSILON: f32 = 1e-6;

fn is_zero(x: f32) -> bool {
    x.abs() < EPSILON
}

fn roughly_equal(a: f32, b: f32) -> bool {
    is_zero(a - b)
}

/// Per-term overhead of the fixed record, before the coefficient
/// pairs.
pub const FIXED_HEADER_BYTES: usize = 19;

/// One serializable objective term.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectiveTerm {
    squared: bool,
    rule_hash: i32,
    constant: f32,
    qii: f32,
    c: f32,
    coefficients: Vec<f32>,
    variable_indexes: Vec<u32>,
    lagrange: f32,
}

impl ObjectiveTerm {
    #[must_use]
    pub fn new(
        squared: bool,
        rule_hash: i32,
        constant: f32,
        qii: f32,
        c: f32,
        coefficients: Vec<f32>,
        variable_indexes: Vec<u32>,
    ) -> Self {
        assert_eq!(coefficients.len(), variable_indexes.len());
        assert!(coefficients.len() <= i16::MAX as usize);

        ObjectiveTerm {
            squared,
            rule_hash,
            constant,
            qii,
            c,
            coefficients,
            variable_indexes,
            lagrange: 0.0,
        }
    }

    /// An empty term for pre-sizing rehydration pools; every field
    /// is overwritten by [`ObjectiveTerm::read_fixed`].
    #[must_use]
    pub fn placeholder() -> Self {
        ObjectiveTerm::new(false, 0, 0.0, 0.0, 0.0, Vec::new(), Vec::new())
    }

    #[must_use]
    pub fn rule_hash(&self) -> i32 {
        self.rule_hash
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.coefficients.len()
    }

    #[must_use]
    pub fn constant(&self) -> f32 {
        self.constant
    }

    #[must_use]
    pub fn coefficients(&self) -> &[f32] {
        &self.coefficients
    }

    #[must_use]
    pub fn variable_indexes(&self) -> &[u32] {
        &self.variable_indexes
    }

    #[must_use]
    pub fn c(&self) -> f32 {
        self.c
    }

    #[must_use]
    pub fn lagrange(&self) -> f32 {
        self.lagrange
    }

    pub fn set_lagrange(&mut self, lagrange: f32) {
        self.lagrange = lagrange;
    }

    fn dot(&self, values: &[f32]) -> f32 {
        self.coefficients
            .iter()
            .zip(&self.variable_indexes)
            .map(|(coefficient, index)| coefficient * values[*index as usize])
            .sum()
    }

    /// The term's contribution to the (c-scaled) objective under
    /// `values`.
    #[must_use]
    pub fn evaluate(&self, weight: f32, values: &[f32]) -> f32 {
        let hinge = (self.dot(values) - self.constant).max(0.0);
        let loss = if self.squared { hinge * hinge } else { hinge };

        weight * self.c * loss
    }

    /// One dual coordinate descent step: update this term's
    /// multiplier along its projected gradient, then push the primal
    /// variables by the multiplier delta.
    pub fn minimize(&mut self, weight: f32, values: &mut [f32], truncate_every_step: bool) {
        let adjusted = weight * self.c;
        let gradient = self.constant - self.dot(values);
        if self.squared {
            // The squared hinge has no box constraint on the dual;
            // the multiplier instead shows up in the gradient.
            let gradient = gradient + self.lagrange / (2.0 * adjusted);
            self.step(gradient, f32::INFINITY, values, truncate_every_step);
        } else {
            self.step(gradient, adjusted, values, truncate_every_step);
        }
    }

    fn step(&mut self, gradient: f32, limit: f32, values: &mut [f32], truncate_every_step: bool) {
        let mut projected = gradient;
        if is_zero(self.lagrange) {
            projected = gradient.min(0.0);
        }
        if roughly_equal(self.lagrange, limit) {
            projected = gradient.max(0.0);
        }
        if is_zero(projected) {
            return;
        }

        let previous = self.lagrange;
        self.lagrange = (previous - gradient / self.qii).max(0.0).min(limit);
        let delta = self.lagrange - previous;
        for (coefficient, index) in self.coefficients.iter().zip(&self.variable_indexes) {
            let slot = &mut values[*index as usize];
            *slot -= delta * coefficient;
            if truncate_every_step {
                *slot = slot.max(0.0).min(1.0);
            }
        }
    }

    /// Bytes this term occupies in a fixed page.
    #[must_use]
    pub fn fixed_byte_size(&self) -> usize {
        FIXED_HEADER_BYTES + 8 * self.coefficients.len()
    }

    /// Appends the fixed (immutable) record to `out`.  The Lagrange
    /// multiplier is volatile and not part of this record.
    pub fn write_fixed(&self, out: &mut Vec<u8>) {
        out.push(u8::from(self.squared));
        out.extend_from_slice(&self.rule_hash.to_le_bytes());
        out.extend_from_slice(&self.constant.to_le_bytes());
        out.extend_from_slice(&self.qii.to_le_bytes());
        out.extend_from_slice(&self.c.to_le_bytes());
        out.extend_from_slice(&(self.coefficients.len() as i16).to_le_bytes());
        for (coefficient, index) in self.coefficients.iter().zip(&self.variable_indexes) {
            out.extend_from_slice(&coefficient.to_le_bytes());
            out.extend_from_slice(&(*index as i32).to_le_bytes());
        }
    }

    /// Overwrites this term in place from the fixed record at
    /// `*cursor` in `buf`, advancing the cursor.
    ///
    /// # Errors
    ///
    /// Returns `Err` when the buffer ends mid-record.
    pub fn read_fixed(&mut self, buf: &[u8], cursor: &mut usize) -> Result<(), &'static str> {
        self.squared = take::<1>(buf, cursor)?[0] != 0;
        self.rule_hash = i32::from_le_bytes(*take::<4>(buf, cursor)?);
        self.constant = f32::from_le_bytes(*take::<4>(buf, cursor)?);
        self.qii = f32::from_le_bytes(*take::<4>(buf, cursor)?);
        self.c = f32::from_le_bytes(*take::<4>(buf, cursor)?);
        let size = i16::from_le_bytes(*take::<2>(buf, cursor)?);
        if size < 0 {
            return Err("negative term size");
        }

        let size = size as usize;
        self.coefficients.clear();
        self.variable_indexes.clear();
        self.coefficients.reserve(size);
        self.variable_indexes.reserve(size);
        for _ in 0..size {
            self.coefficients
                .push(f32::from_le_bytes(*take::<4>(buf, cursor)?));
            let index = i32::from_le_bytes(*take::<4>(buf, cursor)?);
            if index < 0 {
                return Err("negative variable index");
            }
            self.variable_indexes.push(index as u32);
        }
        self.lagrange = 0.0;

        Ok(())
    }
}

fn take<'a, const N: usize>(buf: &'a [u8], cursor: &mut usize) -> Result<&'a [u8; N], &'static str> {
    let slice = buf
        .get(*cursor..*cursor + N)
        .ok_or("truncated term record")?;
    *cursor += N;

    Ok(slice.try_into().expect("exact length"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_term() -> ObjectiveTerm {
        // -b - (-0.9): dissatisfied by 0.9 - b.
        ObjectiveTerm::new(false, 41, -0.9, 1.0, 10.0, vec![-1.0], vec![0])
    }

    #[test]
    fn test_evaluate_linear() {
        let term = linear_term();
        let values = vec![0.2];
        // weight 2 * c 10 * max(0, -0.2 + 0.9) = 14.
        assert!((term.evaluate(2.0, &values) - 14.0).abs() < 1e-4);
    }

    #[test]
    fn test_evaluate_squared() {
        let term = ObjectiveTerm::new(true, 41, -0.9, 1.0, 10.0, vec![-1.0], vec![0]);
        let values = vec![0.2];
        assert!((term.evaluate(2.0, &values) - 2.0 * 10.0 * 0.49).abs() < 1e-4);
    }

    #[test]
    fn test_minimize_reduces_dissatisfaction() {
        let mut term = linear_term();
        let mut values = vec![0.2];
        let before = term.evaluate(2.0, &values);
        for _ in 0..50 {
            term.minimize(2.0, &mut values, true);
        }
        let after = term.evaluate(2.0, &values);

        assert!(after < before);
        assert!(values[0] > 0.2);
        assert!(term.lagrange() >= 0.0);
        assert!(term.lagrange() <= 2.0 * 10.0 + 1e-4);
    }

    #[test]
    fn test_satisfied_term_is_a_no_op() {
        let mut term = linear_term();
        let mut values = vec![1.0];
        term.minimize(2.0, &mut values, true);
        assert_eq!(values[0], 1.0);
        assert_eq!(term.lagrange(), 0.0);
    }

    #[test]
    fn test_fixed_record_round_trip() {
        let term = ObjectiveTerm::new(true, -7, 1.5, 5.0, 10.0, vec![1.0, -1.0], vec![3, 9]);
        let mut bytes = Vec::new();
        term.write_fixed(&mut bytes);
        assert_eq!(bytes.len(), term.fixed_byte_size());

        let mut decoded = ObjectiveTerm::placeholder();
        let mut cursor = 0;
        decoded.read_fixed(&bytes, &mut cursor).expect("decodes");
        assert_eq!(cursor, bytes.len());
        assert_eq!(decoded, term);
    }

    #[test]
    fn test_truncated_record_rejected() {
        let term = linear_term();
        let mut bytes = Vec::new();
        term.write_fixed(&mut bytes);
        bytes.pop();

        let mut decoded = ObjectiveTerm::placeholder();
        let mut cursor = 0;
        assert!(decoded.read_fixed(&bytes, &mut cursor).is_err());
    }
}
