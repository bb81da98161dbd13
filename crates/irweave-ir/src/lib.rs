//! `irweave-ir`: the IR object graph traversed by the irweave bridge.
//!
//! A [`Module`] owns a type table and a value arena. Nodes are boxed and
//! carry a back-pointer to their module, so their addresses are stable and a
//! single node pointer is enough to reach the rest of the graph. Borrowed
//! views ([`ValueRef`], [`TypeRef`]) tie element lifetimes to the module
//! borrow inside Rust.
//!
//! Names, linkage, visibility, DLL storage class and attributes are
//! interior-mutable and can be changed through `&ModuleData`; everything else
//! (new types, values, instructions) needs `&mut Module`.

pub mod attributes;
mod builder;
mod cfg;
mod linkage;
mod module;
mod opcode;
mod printer;
mod types;
mod value;

pub use attributes::{kind_for_name, AttrIndex, AttrKind, Attribute, AttributeList, AttributeSet};
pub use builder::{Builder, InsertPoint};
pub use cfg::write_cfg;
pub use linkage::{DllStorageClass, Linkage, Visibility};
pub use module::{Module, ModuleData};
pub use opcode::{FloatPredicate, IntPredicate, Opcode};
pub use types::{Idx, StructBody, TypeId, TypeKind, TypeNode, TypeRef};
pub use value::{Constant, DebugLoc, Use, ValueCategory, ValueId, ValueNode, ValueRef};
