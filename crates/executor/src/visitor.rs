//! Full-table visits

use stratamap_core::Record;

/// Receives every stored object of one type during
/// [`ObjectMapper::visit_objects`](crate::ObjectMapper::visit_objects)
pub trait ObjectVisitor {
    /// Whether `object` should be passed to [`visit`](ObjectVisitor::visit)
    fn should_include(&self, _object: &Record) -> bool {
        true
    }

    /// Handle one object
    fn visit(&mut self, object: Record);
}

impl<F> ObjectVisitor for F
where
    F: FnMut(Record),
{
    fn visit(&mut self, object: Record) {
        self(object)
    }
}
