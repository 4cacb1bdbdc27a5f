/// A unit of work handed to the launcher. Only its id is used for reporting.
pub trait WorkUnit {
    fn id(&self) -> String;
}

impl WorkUnit for String {
    fn id(&self) -> String {
        self.clone()
    }
}

impl WorkUnit for &'static str {
    fn id(&self) -> String {
        (*self).to_string()
    }
}

/// `(id, payload)` pairs, e.g. a market id and its descriptor.
impl<T> WorkUnit for (String, T) {
    fn id(&self) -> String {
        self.0.clone()
    }
}
