/// Rectified linear unit.
#[derive(Clone, Copy)]
pub struct Relu;

impl Relu {
    pub fn f(&self, x: f32) -> f32 {
        x.max(0.0)
    }

    pub fn df(&self, x: f32) -> f32 {
        if x > 0.0 { 1.0 } else { 0.0 }
    }
}
