use udfkit_ir::{TypeAttr, Value};

/// A value seen by an emit function.
///
/// Either a materialized constant, a raw handle to something the builder
/// produced earlier, or a tuple of either.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Const(Value),
    Raw { handle: u64, attr: TypeAttr },
    Tuple(Vec<NativeValue>),
}

impl NativeValue {
    pub fn create(value: impl Into<Value>) -> Self {
        NativeValue::Const(value.into())
    }

    pub fn create_tuple(fields: Vec<NativeValue>) -> Self {
        NativeValue::Tuple(fields)
    }

    pub fn raw(handle: u64, attr: TypeAttr) -> Self {
        NativeValue::Raw { handle, attr }
    }

    pub fn is_const(&self) -> bool {
        match self {
            NativeValue::Const(_) => true,
            NativeValue::Raw { .. } => false,
            NativeValue::Tuple(fields) => fields.iter().all(NativeValue::is_const),
        }
    }

    pub fn as_const(&self) -> Option<&Value> {
        match self {
            NativeValue::Const(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, NativeValue::Const(Value::Null))
    }

    /// Materialized form, if every leaf is a constant
    pub fn into_value(self) -> Option<Value> {
        match self {
            NativeValue::Const(v) => Some(v),
            NativeValue::Raw { .. } => None,
            NativeValue::Tuple(fields) => fields
                .into_iter()
                .map(NativeValue::into_value)
                .collect::<Option<Vec<_>>>()
                .map(Value::Tuple),
        }
    }

    pub fn get_field(&self, index: usize) -> Option<NativeValue> {
        match self {
            NativeValue::Tuple(fields) => fields.get(index).cloned(),
            NativeValue::Const(Value::Tuple(fields)) => {
                fields.get(index).cloned().map(NativeValue::Const)
            }
            _ => None,
        }
    }
}

impl From<Value> for NativeValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Tuple(fields) => {
                NativeValue::Tuple(fields.into_iter().map(NativeValue::from).collect())
            }
            other => NativeValue::Const(other),
        }
    }
}
