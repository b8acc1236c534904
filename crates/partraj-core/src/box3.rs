use crate::error::{TrajError, TrajResult};

/// Periodic simulation box in canonical form.
///
/// The encoded matrix is upper triangular with a positive diagonal. Its
/// columns are the lattice vectors `a`, `b` and `c`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Box3 {
    pub lx: f64,
    pub ly: f64,
    pub lz: f64,
    pub xy: f64,
    pub xz: f64,
    pub yz: f64,
    pub dimensions: u8,
}

/// `Lz` used for two-dimensional boxes that leave it unspecified.
pub const LZ_2D: f64 = 1.0;

impl Default for Box3 {
    fn default() -> Self {
        Self::cubic(1.0)
    }
}

impl Box3 {
    pub fn cubic(l: f64) -> Self {
        Self::orthorhombic(l, l, l)
    }

    pub fn orthorhombic(lx: f64, ly: f64, lz: f64) -> Self {
        Self {
            lx,
            ly,
            lz,
            xy: 0.0,
            xz: 0.0,
            yz: 0.0,
            dimensions: 3,
        }
    }

    pub fn square(lx: f64, ly: f64, xy: f64) -> Self {
        Self {
            lx,
            ly,
            lz: LZ_2D,
            xy,
            xz: 0.0,
            yz: 0.0,
            dimensions: 2,
        }
    }

    /// Decomposes an upper-triangular matrix with positive diagonal.
    pub fn from_matrix(m: &[[f64; 3]; 3], dimensions: u8) -> TrajResult<Self> {
        let (lx, ly, lz) = (m[0][0], m[1][1], m[2][2]);
        if !(lx > 0.0 && ly > 0.0 && lz > 0.0) {
            return Err(TrajError::Validation(format!(
                "box matrix diagonal must be positive, got ({lx}, {ly}, {lz})"
            )));
        }
        let b = Self {
            lx,
            ly,
            lz,
            xy: m[0][1] / ly,
            xz: m[0][2] / lz,
            yz: m[1][2] / lz,
            dimensions,
        };
        b.validate()?;
        Ok(b)
    }

    pub fn matrix(&self) -> [[f64; 3]; 3] {
        [
            [self.lx, self.xy * self.ly, self.xz * self.lz],
            [0.0, self.ly, self.yz * self.lz],
            [0.0, 0.0, self.lz],
        ]
    }

    /// `[Lx, Ly, Lz, xy, xz, yz]`
    pub fn to_array(&self) -> [f64; 6] {
        [self.lx, self.ly, self.lz, self.xy, self.xz, self.yz]
    }

    /// Volume for 3-D boxes, area for 2-D boxes.
    pub fn volume(&self) -> f64 {
        if self.dimensions == 2 {
            self.lx * self.ly
        } else {
            self.lx * self.ly * self.lz
        }
    }

    pub fn round(&self, digits: u32) -> Self {
        Self {
            lx: round_to(self.lx, digits),
            ly: round_to(self.ly, digits),
            lz: round_to(self.lz, digits),
            xy: round_to(self.xy, digits),
            xz: round_to(self.xz, digits),
            yz: round_to(self.yz, digits),
            dimensions: self.dimensions,
        }
    }

    pub fn is_close(&self, other: &Self, tol: f64) -> bool {
        self.dimensions == other.dimensions
            && self
                .to_array()
                .iter()
                .zip(other.to_array())
                .all(|(a, b)| (a - b).abs() <= tol)
    }

    pub fn validate(&self) -> TrajResult<()> {
        if !matches!(self.dimensions, 2 | 3) {
            return Err(TrajError::Validation(format!(
                "box dimensions must be 2 or 3, got {}",
                self.dimensions
            )));
        }
        let values = self.to_array();
        if values.iter().any(|v| !v.is_finite()) {
            return Err(TrajError::Validation("box contains non-finite values".into()));
        }
        if self.lx <= 0.0 || self.ly <= 0.0 || self.lz <= 0.0 {
            return Err(TrajError::Validation("box lengths must be positive".into()));
        }
        if self.dimensions == 2 && (self.xz != 0.0 || self.yz != 0.0) {
            return Err(TrajError::Validation(
                "2-D box must have xz = yz = 0".into(),
            ));
        }
        Ok(())
    }
}

/// Rounds to `digits` decimal places; values too large to scale are returned as is.
pub fn round_to(value: f64, digits: u32) -> f64 {
    let scale = 10f64.powi(digits as i32);
    let rounded = (value * scale).round() / scale;
    if rounded.is_finite() {
        rounded
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_roundtrip() {
        let b = Box3 {
            lx: 2.0,
            ly: 3.0,
            lz: 4.0,
            xy: 0.5,
            xz: -0.25,
            yz: 0.1,
            dimensions: 3,
        };
        let back = Box3::from_matrix(&b.matrix(), 3).unwrap();
        assert!(b.is_close(&back, 1e-12));
        assert!((b.volume() - 24.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_bad_2d_box() {
        let mut b = Box3::square(2.0, 2.0, 0.0);
        assert!(b.validate().is_ok());
        b.yz = 0.3;
        assert!(matches!(b.validate(), Err(TrajError::Validation(_))));
    }

    #[test]
    fn round_trims_digits() {
        let b = Box3::cubic(1.234_567_891_234_5).round(3);
        assert_eq!(b.lx, 1.235);
    }
}
