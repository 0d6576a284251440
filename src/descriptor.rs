use std::borrow::Cow;

/// Static identity of an intercepted method.
///
/// A descriptor is supplied by the instrumentation host when an
/// interceptor is bound to its target call, and is recorded on the
/// span-event covering that call. It never changes after construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodDescriptor {
    type_name: Cow<'static, str>,
    method_name: Cow<'static, str>,
    parameter_descriptor: Cow<'static, str>,
}

impl MethodDescriptor {
    /// Creates a descriptor from the owning type, method name, and
    /// parameter descriptor of the intercepted method.
    pub fn new(
        type_name: impl Into<Cow<'static, str>>,
        method_name: impl Into<Cow<'static, str>>,
        parameter_descriptor: impl Into<Cow<'static, str>>,
    ) -> Self {
        MethodDescriptor {
            type_name: type_name.into(),
            method_name: method_name.into(),
            parameter_descriptor: parameter_descriptor.into(),
        }
    }

    /// Name of the type declaring the intercepted method.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Name of the intercepted method.
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// Parameter descriptor of the intercepted method.
    pub fn parameter_descriptor(&self) -> &str {
        &self.parameter_descriptor
    }

    /// Fully qualified form used when recording the api annotation.
    pub fn full_name(&self) -> String {
        format!(
            "{}.{}{}",
            self.type_name, self.method_name, self.parameter_descriptor
        )
    }
}
