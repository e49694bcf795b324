//! IR builder services and the context handed to emit functions

use udfkit_ir::TypeAttr;

use crate::{BuildStatus, NativeValue};

/// Basic block that emitted code is appended to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlockId(pub usize);

pub type BuildResult = Result<NativeValue, BuildStatus>;

pub trait TimestampIrBuilder {
    fn hour(&self, block: BlockId, time: &NativeValue) -> BuildResult;
    fn minute(&self, block: BlockId, time: &NativeValue) -> BuildResult;
    fn second(&self, block: BlockId, time: &NativeValue) -> BuildResult;
}

pub trait DateIrBuilder {
    fn year(&self, block: BlockId, date: &NativeValue) -> BuildResult;
    fn month(&self, block: BlockId, date: &NativeValue) -> BuildResult;
    fn day(&self, block: BlockId, date: &NativeValue) -> BuildResult;
}

pub trait StringIrBuilder {
    fn concat(&self, block: BlockId, parts: &[NativeValue]) -> BuildResult;
    fn concat_ws(&self, block: BlockId, sep: &NativeValue, parts: &[NativeValue]) -> BuildResult;
}

pub trait ArithmeticIrBuilder {
    fn add(&self, block: BlockId, lhs: &NativeValue, rhs: &NativeValue) -> BuildResult;
}

/// Access to every builder service
pub trait IrBuilders {
    fn timestamp(&self) -> &dyn TimestampIrBuilder;
    fn date(&self) -> &dyn DateIrBuilder;
    fn string(&self) -> &dyn StringIrBuilder;
    fn arithmetic(&self) -> &dyn ArithmeticIrBuilder;
}

pub struct CodeGenContext<'a> {
    builders: &'a dyn IrBuilders,
    current_block: BlockId,
    next_handle: u64,
}

impl<'a> CodeGenContext<'a> {
    pub fn new(builders: &'a dyn IrBuilders) -> Self {
        Self {
            builders,
            current_block: BlockId::default(),
            next_handle: 0,
        }
    }

    pub fn builders(&self) -> &'a dyn IrBuilders {
        self.builders
    }

    pub fn current_block(&self) -> BlockId {
        self.current_block
    }

    pub fn set_block(&mut self, block: BlockId) {
        self.current_block = block;
    }

    /// Allocates a handle for a value only known at run time
    pub fn fresh_raw(&mut self, attr: TypeAttr) -> NativeValue {
        let handle = self.next_handle;
        self.next_handle += 1;
        NativeValue::raw(handle, attr)
    }
}
