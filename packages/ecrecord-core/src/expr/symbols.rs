use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::context::{ExpressionContext, SymbolExpressionContext};
use super::evaluator::EvaluationResult;
use super::operations::{arithmetic_promotion, convert_to_double};
use crate::error::ExpressionError;
use crate::instance::InstanceHandle;
use crate::types::EcValue;

pub type StaticMethod = Arc<dyn Fn(&[EvaluationResult]) -> Result<EvaluationResult, ExpressionError> + Send + Sync>;
pub type InstanceMethod =
    Arc<dyn Fn(&[InstanceHandle], &[EvaluationResult]) -> Result<EvaluationResult, ExpressionError> + Send + Sync>;

/// Callable published under a method symbol.
#[derive(Clone)]
pub enum MethodReference {
    /// Called without a target, e.g. `System.Math.Abs(x)`
    Static(StaticMethod),
    /// Called on the instances accumulated so far, e.g. `this.Describe()`
    Instance(InstanceMethod),
}

impl fmt::Debug for MethodReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodReference::Static(_) => f.write_str("MethodReference::Static"),
            MethodReference::Instance(_) => f.write_str("MethodReference::Instance"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValueSymbol {
    pub name: String,
    pub value: EcValue,
}

#[derive(Clone)]
pub struct ContextSymbol {
    pub name: String,
    pub context: Arc<dyn ExpressionContext>,
}

impl fmt::Debug for ContextSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextSymbol").field("name", &self.name).finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct MethodSymbol {
    pub name: String,
    pub method: MethodReference,
}

/// Named entry of a [`SymbolExpressionContext`].
#[derive(Debug, Clone)]
pub enum Symbol {
    Value(ValueSymbol),
    Context(ContextSymbol),
    Method(MethodSymbol),
}

impl Symbol {
    pub fn value(name: &str, value: impl Into<EcValue>) -> Self {
        Symbol::Value(ValueSymbol {
            name: name.to_string(),
            value: value.into(),
        })
    }

    pub fn context(name: &str, context: Arc<dyn ExpressionContext>) -> Self {
        Symbol::Context(ContextSymbol {
            name: name.to_string(),
            context,
        })
    }

    pub fn static_method(
        name: &str,
        method: impl Fn(&[EvaluationResult]) -> Result<EvaluationResult, ExpressionError> + Send + Sync + 'static,
    ) -> Self {
        Symbol::Method(MethodSymbol {
            name: name.to_string(),
            method: MethodReference::Static(Arc::new(method)),
        })
    }

    pub fn instance_method(
        name: &str,
        method: impl Fn(&[InstanceHandle], &[EvaluationResult]) -> Result<EvaluationResult, ExpressionError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Symbol::Method(MethodSymbol {
            name: name.to_string(),
            method: MethodReference::Instance(Arc::new(method)),
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Symbol::Value(s) => &s.name,
            Symbol::Context(s) => &s.name,
            Symbol::Method(s) => &s.name,
        }
    }
}

/// Source of symbols published into evaluation contexts.
pub trait SymbolProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Adds this provider's symbols to `context`. `requested` names symbol
    /// sets the caller needs; empty means all.
    fn publish_symbols(&self, context: &mut SymbolExpressionContext, requested: &[&str]);
}

/// Registered symbol providers, published in registration order.
#[derive(Default)]
pub struct SymbolProviderRegistry {
    providers: Mutex<Vec<Arc<dyn SymbolProvider>>>,
}

impl SymbolProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the `System` provider.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(SystemSymbolProvider));
        registry
    }

    /// Registers a provider. Returns false when one with the same name is
    /// already registered.
    pub fn register(&self, provider: Arc<dyn SymbolProvider>) -> bool {
        let mut providers = self.providers.lock();
        if providers.iter().any(|p| p.name() == provider.name()) {
            tracing::warn!("Symbol provider '{}' already registered", provider.name());
            return false;
        }
        tracing::debug!("Registered symbol provider '{}'", provider.name());
        providers.push(provider);
        true
    }

    pub fn unregister(&self, name: &str) -> bool {
        let mut providers = self.providers.lock();
        let before = providers.len();
        providers.retain(|p| p.name() != name);
        before != providers.len()
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.lock().iter().map(|p| p.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.lock().is_empty()
    }

    /// Publishes every provider into `context`, in registration order.
    pub fn publish_symbols(&self, context: &mut SymbolExpressionContext, requested: &[&str]) {
        // providers may touch the registry while publishing
        let providers = self.providers.lock().clone();
        for provider in providers {
            provider.publish_symbols(context, requested);
        }
    }

    /// Removes every provider.
    pub fn reset(&self) {
        self.providers.lock().clear();
    }
}

impl fmt::Debug for SymbolProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymbolProviderRegistry")
            .field("providers", &self.provider_names())
            .finish()
    }
}

/// Publishes `System.Math`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSymbolProvider;

impl SymbolProvider for SystemSymbolProvider {
    fn name(&self) -> &str {
        "System"
    }

    fn publish_symbols(&self, context: &mut SymbolExpressionContext, requested: &[&str]) {
        if !requested.is_empty() && !requested.iter().any(|r| r.eq_ignore_ascii_case("System")) {
            return;
        }
        let mut math = SymbolExpressionContext::new();
        math.add_symbol(Symbol::value("PI", std::f64::consts::PI));
        math.add_symbol(Symbol::value("E", std::f64::consts::E));
        math.add_symbol(Symbol::static_method("Abs", |args| {
            let value = match single_value("Abs", args)? {
                EcValue::Integer(v) => EcValue::Integer(v.wrapping_abs()),
                EcValue::Long(v) => EcValue::Long(v.wrapping_abs()),
                other => EcValue::Double(convert_to_double(&other)?.abs()),
            };
            Ok(value.into())
        }));
        math.add_symbol(Symbol::static_method("Min", |args| min_max("Min", args, true)));
        math.add_symbol(Symbol::static_method("Max", |args| min_max("Max", args, false)));
        math.add_symbol(Symbol::static_method("Sqrt", |args| unary_double("Sqrt", args, f64::sqrt)));
        math.add_symbol(Symbol::static_method("Round", |args| unary_double("Round", args, f64::round)));
        math.add_symbol(Symbol::static_method("Floor", |args| unary_double("Floor", args, f64::floor)));
        math.add_symbol(Symbol::static_method("Ceiling", |args| unary_double("Ceiling", args, f64::ceil)));
        math.add_symbol(Symbol::static_method("Pow", |args| {
            let [base, exponent] = values::<2>("Pow", args)?;
            Ok(EcValue::Double(convert_to_double(&base)?.powf(convert_to_double(&exponent)?)).into())
        }));

        let mut system = SymbolExpressionContext::new();
        system.add_symbol(Symbol::context("Math", Arc::new(math)));
        context.add_symbol(Symbol::context("System", Arc::new(system)));
    }
}

fn values<const N: usize>(method: &str, args: &[EvaluationResult]) -> Result<[EcValue; N], ExpressionError> {
    let values = args
        .iter()
        .map(|arg| arg.clone().into_value())
        .collect::<Result<Vec<_>, _>>()?;
    values
        .try_into()
        .map_err(|_| ExpressionError::WrongType(format!("{method} expects {N} argument(s)")))
}

fn single_value(method: &str, args: &[EvaluationResult]) -> Result<EcValue, ExpressionError> {
    let [value] = values::<1>(method, args)?;
    Ok(value)
}

fn unary_double(method: &str, args: &[EvaluationResult], f: fn(f64) -> f64) -> Result<EvaluationResult, ExpressionError> {
    let value = single_value(method, args)?;
    if value.is_null() {
        return Ok(EcValue::Null.into());
    }
    Ok(EcValue::Double(f(convert_to_double(&value)?)).into())
}

fn min_max(method: &str, args: &[EvaluationResult], min: bool) -> Result<EvaluationResult, ExpressionError> {
    let [a, b] = values::<2>(method, args)?;
    let (a, b) = arithmetic_promotion(a, b, false)?;
    let pick_first = match (&a, &b) {
        (EcValue::Integer(x), EcValue::Integer(y)) => (x <= y) == min,
        (EcValue::Long(x), EcValue::Long(y)) => (x <= y) == min,
        (EcValue::Double(x), EcValue::Double(y)) => (x <= y) == min,
        (l, _) => return Err(ExpressionError::WrongType(format!("{method} on {}", l.kind_name()))),
    };
    Ok(if pick_first { a } else { b }.into())
}
