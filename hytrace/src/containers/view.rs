//! Key and value views.
//!
//! A view owns nothing: it refers to a logical container and reads the owner's
//! current snapshot at every access, so mutations of the owner made after the
//! view was created are visible through it.
use auto_enums::auto_enum;
use indexmap::IndexMap;
use strum::{Display, EnumIs};

use crate::{
    codegen::Emitter,
    containers::{ContainerId, ViewMethod, expect_args, expect_no_kwargs, key::HashableKey},
    tracer::Tracer,
    utils::{Error, TraceResult},
    value::{SymbolicValue, ValueId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIs, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ViewKind {
    Keys,
    Values,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DictView {
    pub owner: ContainerId,
    pub kind: ViewKind,
}

impl DictView {
    fn receiver(&self) -> String {
        format!("dict_{}", self.kind)
    }
}

impl Tracer {
    /// Iterate the view over the owner's current snapshot.
    #[auto_enum]
    pub fn view_iter(&self, view: &DictView) -> TraceResult<impl Iterator<Item = ValueId> + '_> {
        let entries = &self.snapshot(view.owner)?.entries;
        #[auto_enum(Iterator)]
        let iter = match view.kind {
            ViewKind::Keys => entries.keys().map(HashableKey::value),
            ViewKind::Values => entries.values().copied(),
        };
        Ok(iter)
    }

    pub fn view_len(&self, view: &DictView) -> TraceResult<usize> {
        Ok(self.snapshot(view.owner)?.len())
    }

    /// Membership test; only key views support it.
    pub fn view_contains(&mut self, view: &DictView, element: ValueId) -> TraceResult<bool> {
        if !view.kind.is_keys() {
            return Err(Error::unsupported(view.receiver(), "__contains__"));
        }
        if !HashableKey::is_hashable(self, element) {
            return Ok(false);
        }
        let key = HashableKey::wrap(self, element)?;
        let present = self.snapshot(view.owner)?.entries.contains_key(&key);
        self.guard_key(view.owner, &key, present)?;
        Ok(present)
    }

    pub(crate) fn call_view_method(
        &mut self,
        view: DictView,
        name: &str,
        args: &[ValueId],
        kwargs: &IndexMap<String, ValueId>,
    ) -> TraceResult<ValueId> {
        let receiver = view.receiver();
        let method = name
            .parse::<ViewMethod>()
            .map_err(|_| Error::unsupported(receiver.as_str(), name))?;
        expect_no_kwargs(&receiver, name, kwargs)?;

        match method {
            ViewMethod::Len => {
                expect_args(&receiver, name, args, 0, 0)?;
                let len = self.view_len(&view)? as i64;
                Ok(self.constant(len))
            }
            ViewMethod::Iter => {
                expect_args(&receiver, name, args, 0, 0)?;
                let items = self.view_iter(&view)?.collect();
                Ok(self.alloc(SymbolicValue::Tuple(items)))
            }
            ViewMethod::Contains => {
                expect_args(&receiver, name, args, 1, 1)?;
                let present = self.view_contains(&view, args[0])?;
                Ok(self.constant(present))
            }
        }
    }

    /// Rebuild the owner, then call its accessor.
    pub(crate) fn reconstruct_view(&self, view: &DictView, out: &mut dyn Emitter) -> TraceResult<()> {
        self.reconstruct_container(view.owner, out)?;
        out.emit_load_method_call(&view.kind.to_string(), 0);
        Ok(())
    }
}
