/// Logistic sigmoid scaled by `amp`.
#[derive(Clone, Copy)]
pub struct Sigmoid {
    amp: f32,
}

impl Sigmoid {
    pub fn new(amp: f32) -> Self {
        Self { amp }
    }

    pub fn f(&self, x: f32) -> f32 {
        self.amp / (1.0 + (-x).exp())
    }

    pub fn df(&self, x: f32) -> f32 {
        let s = 1.0 / (1.0 + (-x).exp());
        self.amp * s * (1.0 - s)
    }
}
