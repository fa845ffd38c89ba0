use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::evaluator::{checked_index, evaluate_index, invoke_method, EvaluationResult, ValueList};
use super::node::{PrimaryList, PrimaryStep};
use super::symbols::{MethodReference, Symbol};
use crate::error::ExpressionError;
use crate::instance::InstanceHandle;
use crate::types::{EcValue, PrimitiveType, TypeDescriptor};

/// Resolution scope for access paths.
///
/// Contexts form a chain: a context that does not know a name hands the
/// lookup to the next one. `global` is the outermost context of the
/// current evaluation and is used for sub-expressions such as array indices.
pub trait ExpressionContext: Send + Sync {
    /// Resolves `primary` from step `start` on. Returns the value and the
    /// index of the first step not consumed.
    fn get_value(
        &self,
        primary: &PrimaryList,
        start: usize,
        global: &dyn ExpressionContext,
    ) -> Result<(EvaluationResult, usize), ExpressionError>;

    /// Resolves `primary` from step `start` to an assignable primitive property.
    fn get_reference(
        &self,
        primary: &PrimaryList,
        start: usize,
        global: &dyn ExpressionContext,
    ) -> Result<PropertyReference, ExpressionError>;

    fn resolve_method(&self, name: &str) -> Result<MethodReference, ExpressionError>;
}

/// Assignable primitive property or primitive array element.
#[derive(Debug, Clone)]
pub struct PropertyReference {
    pub instance: InstanceHandle,
    pub access_string: String,
    pub index: Option<u32>,
}

impl PropertyReference {
    pub fn get_value(&self) -> Result<EcValue, ExpressionError> {
        let instance = self.instance.read();
        let value = match self.index {
            None => instance.get_value(&self.access_string)?,
            Some(index) => instance.get_value_at(&self.access_string, index)?,
        };
        Ok(value)
    }

    pub fn primitive_type(&self) -> Result<PrimitiveType, ExpressionError> {
        self.instance
            .read()
            .class_layout()
            .get_property_layout(&self.access_string)
            .and_then(|prop| prop.primitive_type())
            .ok_or(ExpressionError::PrimitiveRequired)
    }

    pub fn set_value(&self, value: &EcValue) -> Result<(), ExpressionError> {
        let mut instance = self.instance.write();
        match self.index {
            None => instance.set_value(&self.access_string, value)?,
            Some(index) => instance.set_value_at(&self.access_string, index, value)?,
        };
        Ok(())
    }
}

/// Symbol table with case-insensitive names.
///
/// Names not found here go to the fallback context (instance properties when
/// built with [`SymbolExpressionContext::for_instances`]) and then to the
/// outer context.
#[derive(Default)]
pub struct SymbolExpressionContext {
    symbols: HashMap<String, Symbol>,
    fallback: Option<Arc<dyn ExpressionContext>>,
    outer: Option<Arc<dyn ExpressionContext>>,
}

impl SymbolExpressionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outer(outer: Arc<dyn ExpressionContext>) -> Self {
        Self {
            outer: Some(outer),
            ..Self::default()
        }
    }

    /// Context publishing `this` for `instances`; bare identifiers resolve
    /// against their properties.
    pub fn for_instances(instances: Vec<InstanceHandle>) -> Self {
        let instance_context: Arc<dyn ExpressionContext> = Arc::new(InstanceListExpressionContext::new(instances));
        let mut context = Self {
            fallback: Some(Arc::clone(&instance_context)),
            ..Self::default()
        };
        context.add_symbol(Symbol::context("this", instance_context));
        context
    }

    pub fn set_outer(&mut self, outer: Arc<dyn ExpressionContext>) {
        self.outer = Some(outer);
    }

    /// Adds a symbol, replacing one with the same name.
    pub fn add_symbol(&mut self, symbol: Symbol) {
        self.symbols.insert(symbol.name().to_ascii_lowercase(), symbol);
    }

    pub fn remove_symbol(&mut self, name: &str) -> bool {
        self.symbols.remove(&name.to_ascii_lowercase()).is_some()
    }

    pub fn find_symbol(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(&name.to_ascii_lowercase())
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    /// Runs `lookup` on the fallback and then the outer context.
    fn delegate<T>(
        &self,
        name: &str,
        lookup: impl Fn(&dyn ExpressionContext) -> Result<T, ExpressionError>,
    ) -> Result<T, ExpressionError> {
        if let Some(fallback) = &self.fallback {
            match lookup(fallback.as_ref()) {
                Err(ExpressionError::UnknownSymbol(_)) => {}
                result => return result,
            }
        }
        match &self.outer {
            Some(outer) => lookup(outer.as_ref()),
            None => Err(ExpressionError::UnknownSymbol(name.to_string())),
        }
    }
}

fn context_as_value(primary: &PrimaryList, start: usize) -> ExpressionError {
    ExpressionError::WrongType(format!("symbol context '{}' used as a value", primary.prefix_text(start)))
}

impl ExpressionContext for SymbolExpressionContext {
    fn get_value(
        &self,
        primary: &PrimaryList,
        start: usize,
        global: &dyn ExpressionContext,
    ) -> Result<(EvaluationResult, usize), ExpressionError> {
        let Some(name) = primary.name_at(start) else {
            return Err(context_as_value(primary, start));
        };
        let step = &primary.steps[start];
        match (self.find_symbol(name), step) {
            (Some(Symbol::Method(symbol)), PrimaryStep::Call { arguments, .. }) => {
                Ok((invoke_method(&symbol.method, None, arguments, global)?, start + 1))
            }
            (Some(_), PrimaryStep::Call { .. }) => Err(ExpressionError::MethodRequired(name.to_string())),
            (Some(Symbol::Method(_)), _) => Err(ExpressionError::WrongType(format!("method '{name}' used as a value"))),
            (Some(Symbol::Value(symbol)), _) => Ok((EvaluationResult::Value(symbol.value.clone()), start + 1)),
            (Some(Symbol::Context(symbol)), _) => symbol.context.get_value(primary, start + 1, global),
            (None, _) => self.delegate(name, |context| context.get_value(primary, start, global)),
        }
    }

    fn get_reference(
        &self,
        primary: &PrimaryList,
        start: usize,
        global: &dyn ExpressionContext,
    ) -> Result<PropertyReference, ExpressionError> {
        let Some(name) = primary.name_at(start) else {
            return Err(ExpressionError::NeedsLValue);
        };
        match self.find_symbol(name) {
            Some(Symbol::Context(symbol)) => symbol.context.get_reference(primary, start + 1, global),
            Some(_) => Err(ExpressionError::NeedsLValue),
            None => self.delegate(name, |context| context.get_reference(primary, start, global)),
        }
    }

    fn resolve_method(&self, name: &str) -> Result<MethodReference, ExpressionError> {
        match self.find_symbol(name) {
            Some(Symbol::Method(symbol)) => Ok(symbol.method.clone()),
            Some(_) => Err(ExpressionError::MethodRequired(name.to_string())),
            None => match &self.outer {
                Some(outer) => outer.resolve_method(name),
                None => Err(ExpressionError::UnknownSymbol(name.to_string())),
            },
        }
    }
}

impl fmt::Debug for SymbolExpressionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.symbols.values().map(Symbol::name).collect();
        names.sort_unstable();
        f.debug_struct("SymbolExpressionContext")
            .field("symbols", &names)
            .field("has_fallback", &self.fallback.is_some())
            .field("has_outer", &self.outer.is_some())
            .finish()
    }
}

/// Where a property path walk stopped.
enum PathEnd {
    Instances(Vec<InstanceHandle>, usize),
    Primitive {
        instance: InstanceHandle,
        access_string: String,
        index: Option<u32>,
        next: usize,
    },
    Array {
        instance: InstanceHandle,
        access_string: String,
        next: usize,
    },
    EmbeddedStruct,
    NullElement(usize),
}

/// Resolves property paths against a list of instances.
///
/// The first instance whose class has the leading property is used. Struct
/// members extend the access string, struct array elements switch to the
/// element instance, and array indices are evaluated in the global context.
#[derive(Debug, Clone)]
pub struct InstanceListExpressionContext {
    instances: Vec<InstanceHandle>,
}

impl InstanceListExpressionContext {
    pub fn new(instances: Vec<InstanceHandle>) -> Self {
        Self { instances }
    }

    pub fn instances(&self) -> &[InstanceHandle] {
        &self.instances
    }

    fn resolve_path(
        &self,
        primary: &PrimaryList,
        start: usize,
        global: &dyn ExpressionContext,
    ) -> Result<PathEnd, ExpressionError> {
        if !matches!(primary.steps.get(start), Some(PrimaryStep::Ident(_) | PrimaryStep::Member(_))) {
            return Ok(PathEnd::Instances(self.instances.clone(), start));
        }
        let first = primary.name_at(start).unwrap_or_default();
        let mut instance = self
            .instances
            .iter()
            .find(|h| h.read().class_layout().get_property_layout(first).is_some())
            .cloned()
            .ok_or_else(|| not_found(primary, start))?;

        let mut access_string = String::new();
        let mut step = start;
        loop {
            let name = match &primary.steps[step] {
                PrimaryStep::Ident(name) | PrimaryStep::Member(name) => name,
                _ => return Err(not_found(primary, step)),
            };
            if access_string.is_empty() {
                access_string.push_str(name);
            } else {
                access_string = format!("{access_string}.{name}");
            }
            let descriptor = instance
                .read()
                .class_layout()
                .get_property_layout(&access_string)
                .map(|prop| prop.type_descriptor().clone())
                .ok_or_else(|| not_found(primary, step))?;
            step += 1;

            match descriptor {
                TypeDescriptor::Primitive(_) => {
                    return Ok(PathEnd::Primitive {
                        instance,
                        access_string,
                        index: None,
                        next: step,
                    })
                }
                TypeDescriptor::Struct => match primary.steps.get(step) {
                    Some(PrimaryStep::Member(_)) => continue,
                    _ => return Ok(PathEnd::EmbeddedStruct),
                },
                descriptor @ (TypeDescriptor::PrimitiveArray(_) | TypeDescriptor::StructArray) => {
                    let Some(PrimaryStep::Index(node)) = primary.steps.get(step) else {
                        return Ok(PathEnd::Array {
                            instance,
                            access_string,
                            next: step,
                        });
                    };
                    let requested = evaluate_index(node, global)?;
                    let count = instance.read().array_count(&access_string)?;
                    let index = checked_index(requested, count)?;
                    step += 1;

                    if !descriptor.is_struct_array() {
                        return Ok(PathEnd::Primitive {
                            instance,
                            access_string,
                            index: Some(index),
                            next: step,
                        });
                    }
                    let element = instance.read().get_value_at(&access_string, index)?;
                    let EcValue::Struct(Some(element)) = element else {
                        return Ok(PathEnd::NullElement(step));
                    };
                    if !matches!(primary.steps.get(step), Some(PrimaryStep::Member(_))) {
                        return Ok(PathEnd::Instances(vec![element], step));
                    }
                    instance = element;
                    access_string.clear();
                }
            }
        }
    }
}

fn not_found(primary: &PrimaryList, step: usize) -> ExpressionError {
    let name = primary.name_at(step).unwrap_or_default().to_string();
    match primary.steps.get(step) {
        Some(PrimaryStep::Ident(_)) => ExpressionError::UnknownSymbol(name),
        _ => ExpressionError::UnknownMember(name),
    }
}

impl ExpressionContext for InstanceListExpressionContext {
    fn get_value(
        &self,
        primary: &PrimaryList,
        start: usize,
        global: &dyn ExpressionContext,
    ) -> Result<(EvaluationResult, usize), ExpressionError> {
        let resolved = match self.resolve_path(primary, start, global)? {
            PathEnd::Instances(instances, next) => (EvaluationResult::Instances(instances), next),
            PathEnd::Primitive {
                instance,
                access_string,
                index,
                next,
            } => {
                let instance = instance.read();
                let value = match index {
                    None => instance.get_value(&access_string)?,
                    Some(index) => instance.get_value_at(&access_string, index)?,
                };
                (EvaluationResult::Value(value), next)
            }
            PathEnd::Array {
                instance,
                access_string,
                next,
            } => (EvaluationResult::ValueList(ValueList::new(instance, access_string)), next),
            PathEnd::EmbeddedStruct => return Err(ExpressionError::PrimitiveRequired),
            PathEnd::NullElement(next) => (EvaluationResult::Value(EcValue::Null), next),
        };
        Ok(resolved)
    }

    fn get_reference(
        &self,
        primary: &PrimaryList,
        start: usize,
        global: &dyn ExpressionContext,
    ) -> Result<PropertyReference, ExpressionError> {
        match self.resolve_path(primary, start, global)? {
            PathEnd::Primitive {
                instance,
                access_string,
                index,
                next,
            } if next == primary.len() => Ok(PropertyReference {
                instance,
                access_string,
                index,
            }),
            PathEnd::Primitive { .. } => Err(ExpressionError::NeedsLValue),
            _ => Err(ExpressionError::PrimitiveRequired),
        }
    }

    fn resolve_method(&self, name: &str) -> Result<MethodReference, ExpressionError> {
        Err(ExpressionError::UnknownSymbol(name.to_string()))
    }
}

/// Binds a lambda parameter for the evaluation of its body.
pub struct LambdaScope<'a> {
    parameter: &'a str,
    value: EvaluationResult,
    outer: &'a dyn ExpressionContext,
}

impl<'a> LambdaScope<'a> {
    pub fn new(parameter: &'a str, value: EvaluationResult, outer: &'a dyn ExpressionContext) -> Self {
        Self { parameter, value, outer }
    }

    fn binds(&self, primary: &PrimaryList, start: usize) -> bool {
        matches!(primary.steps.get(start), Some(PrimaryStep::Ident(name)) if name.eq_ignore_ascii_case(self.parameter))
    }
}

impl ExpressionContext for LambdaScope<'_> {
    fn get_value(
        &self,
        primary: &PrimaryList,
        start: usize,
        global: &dyn ExpressionContext,
    ) -> Result<(EvaluationResult, usize), ExpressionError> {
        if self.binds(primary, start) {
            return Ok((self.value.clone(), start + 1));
        }
        self.outer.get_value(primary, start, global)
    }

    fn get_reference(
        &self,
        primary: &PrimaryList,
        start: usize,
        global: &dyn ExpressionContext,
    ) -> Result<PropertyReference, ExpressionError> {
        if !self.binds(primary, start) {
            return self.outer.get_reference(primary, start, global);
        }
        match &self.value {
            EvaluationResult::Instances(instances) => {
                InstanceListExpressionContext::new(instances.clone()).get_reference(primary, start + 1, global)
            }
            _ => Err(ExpressionError::NeedsLValue),
        }
    }

    fn resolve_method(&self, name: &str) -> Result<MethodReference, ExpressionError> {
        self.outer.resolve_method(name)
    }
}
