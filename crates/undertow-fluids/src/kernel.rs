use std::f32::consts::PI;

/// Pair distance terms shared by every kernel evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelSample {
    /// Pair distance.
    pub r: f32,
    /// `1 - r / h`.
    pub a: f32,
}

/// Smoothing kernels with compact support `h`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kernel {
    h: f32,
    h2: f32,
    eps2: f32,
    mass: f32,
    kern: f32,
    kern_norm: f32,
}

impl Kernel {
    pub fn new(h: f32, mass: f32, eps: f32) -> Self {
        let h2 = h * h;

        Self {
            h,
            h2,
            eps2: eps * eps,
            mass,
            kern: 20.0 / (2.0 * PI * h2),
            kern_norm: 30.0 / (2.0 * PI * h2),
        }
    }

    #[inline(always)]
    pub fn mass(&self) -> f32 {
        self.mass
    }

    /// Normalization of the cubic density kernel.
    #[inline(always)]
    pub fn kern(&self) -> f32 {
        self.kern
    }

    /// Normalization of the quartic near-density kernel.
    #[inline(always)]
    pub fn kern_norm(&self) -> f32 {
        self.kern_norm
    }

    /// Returns `None` for degenerate pairs and pairs outside the support.
    #[inline]
    pub fn sample(&self, r2: f32) -> Option<KernelSample> {
        if r2 < self.eps2 || r2 > self.h2 {
            return None;
        }

        let r = r2.sqrt();
        Some(KernelSample { r, a: 1.0 - r / self.h })
    }

    #[inline]
    pub fn density(&self, s: KernelSample) -> f32 {
        self.mass * s.a * s.a * s.a * self.kern
    }

    #[inline]
    pub fn near_density(&self, s: KernelSample) -> f32 {
        let a2 = s.a * s.a;
        self.mass * a2 * a2 * self.kern_norm
    }
}
