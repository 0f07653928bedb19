//! Control parameters: values set from outside the graph between updates.

#[derive(Clone, Debug, PartialEq)]
pub struct ControlParameter<T> {
    pub(crate) value: T,
}

impl<T> ControlParameter<T> {
    pub fn new(value: T) -> Self {
        ControlParameter { value }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn set(&mut self, value: T) {
        self.value = value;
    }
}
