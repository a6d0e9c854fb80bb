//! Function-signature adapter: per-parameter and return-type functions for a
//! function-like type, with a fixed number of leading parameters left out.
//!
//! Arguments are passed without the skipped parameters, so position `0` is
//! the first adapted parameter. Error paths start with that position.
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{AdapterError, CompileError};
use crate::exec::{ClassRegistry, PathItem, ValidationError};
use crate::jit::builders::{JitBuilder, JitFunctions};
use crate::jit::cache::JitRegistry;
use crate::mock::{mock_params, MockOptions, MockPromise, MockPromiseFn};
use crate::runtype::{FunctionLike, Member, NodeId, RunType, RunTypes};
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct ParamFns {
    pub name: String,
    /// Position among the adapted (non-skipped) parameters.
    pub position: usize,
    pub optional: bool,
    /// `...name: T[]`; the functions check one element.
    pub rest: bool,
    pub fns: JitFunctions,
}

pub struct FnSignature {
    rts: Arc<RunTypes>,
    function: FunctionLike,
    skip: usize,
    params: Vec<ParamFns>,
    min_args: usize,
    max_args: Option<usize>,
    ret: JitFunctions,
    ret_mock: MockPromiseFn,
    returns_promise: bool,
    mock_options: MockOptions,
    rng: Mutex<fastrand::Rng>,
}

impl FnSignature {
    pub(crate) fn build(
        rts: Arc<RunTypes>,
        id: NodeId,
        skip: usize,
        registry: &Arc<JitRegistry>,
        classes: &Arc<ClassRegistry>,
        config: &EngineConfig,
    ) -> Result<Self, CompileError> {
        let node = rts.node(id);
        let RunType::Function(function) = &node.kind else {
            return Err(CompileError::NotAFunction(node.jit_id.clone()));
        };
        let function = function.clone();
        if skip > function.params.len() {
            return Err(CompileError::SkipTooLarge { skip, params: function.params.len() });
        }
        let builder = JitBuilder::new(&rts, registry, classes, config);

        let mut params = Vec::new();
        for (position, p) in function.params.iter().skip(skip).enumerate() {
            let param = rts.node(*p);
            let RunType::Member(Member::Parameter { name, child, rest }) = &param.kind else {
                return Err(CompileError::UnexpectedKind {
                    id: param.src,
                    found: param.kind_name(),
                    expected: "parameter",
                });
            };
            params.push(ParamFns {
                name: name.clone(),
                position,
                optional: param.optional,
                rest: *rest,
                fns: builder.all(*child)?,
            });
        }
        let min_args = params.iter().rposition(|p| !p.optional && !p.rest).map_or(0, |i| i + 1);
        let max_args = match params.last() {
            Some(p) if p.rest => None,
            _ => Some(params.len()),
        };

        let (ret_id, returns_promise) = match &rts.node(function.ret).kind {
            RunType::Member(Member::Promise { child }) => (*child, true),
            _ => (function.ret, false),
        };
        let ret = builder.all(ret_id)?;
        let ret_mock = MockPromiseFn::build(rts.clone(), ret_id, config.mock.clone())?;
        debug!(
            function = %node.jit_id,
            skip,
            params = params.len(),
            returns_promise,
            "built signature adapter"
        );

        let mock_options = config.mock.clone();
        let rng = Mutex::new(match mock_options.seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        });
        Ok(Self {
            rts,
            function,
            skip,
            params,
            min_args,
            max_args,
            ret,
            ret_mock,
            returns_promise,
            mock_options,
            rng,
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.function.name.as_deref()
    }

    pub fn params(&self) -> &[ParamFns] {
        &self.params
    }

    pub fn returns(&self) -> &JitFunctions {
        &self.ret
    }

    pub fn returns_promise(&self) -> bool {
        self.returns_promise
    }

    pub fn arity(&self) -> (usize, Option<usize>) {
        (self.min_args, self.max_args)
    }

    pub fn check_count(&self, found: usize) -> Result<(), AdapterError> {
        let too_many = self.max_args.is_some_and(|max| found > max);
        if found < self.min_args || too_many {
            return Err(AdapterError::ArgCount { min: self.min_args, max: self.max_args, found });
        }
        Ok(())
    }

    /// Each supplied argument with its parameter. Explicit `undefined` for an
    /// optional parameter counts as omitted.
    fn bind<'s, 'v>(&'s self, args: &'v [Value]) -> Result<Vec<(usize, &'s ParamFns, &'v Value)>, AdapterError> {
        self.check_count(args.len())?;
        let mut out = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let Some(param) = self.params.get(i).or_else(|| self.params.last().filter(|p| p.rest)) else {
                break;
            };
            if param.optional && !param.rest && arg.is_undefined() {
                continue;
            }
            out.push((i, param, arg));
        }
        Ok(out)
    }

    // ---- parameters --------------------------------------------------------

    pub fn params_is_type(&self, args: &[Value]) -> Result<bool, AdapterError> {
        Ok(self.bind(args)?.into_iter().all(|(_, p, v)| p.fns.is_type.call(v)))
    }

    pub fn params_type_errors(&self, args: &[Value]) -> Result<Vec<ValidationError>, AdapterError> {
        let mut errors = Vec::new();
        for (i, p, v) in self.bind(args)? {
            errors.extend(p.fns.type_errors.call_at(v, &[PathItem::Index(i)]));
        }
        Ok(errors)
    }

    pub fn params_encode(&self, args: &[Value]) -> Result<Vec<serde_json::Value>, AdapterError> {
        let bound = self.bind(args)?;
        let mut out = vec![serde_json::Value::Null; args.len()];
        for (i, p, v) in bound {
            out[i] = p.fns.json_encode.call(v)?;
        }
        Ok(out)
    }

    pub fn params_decode(&self, json: Vec<serde_json::Value>) -> Result<Vec<Value>, AdapterError> {
        self.check_count(json.len())?;
        let mut out = Vec::with_capacity(json.len());
        for (i, item) in json.into_iter().enumerate() {
            let param = self.params.get(i).or_else(|| self.params.last().filter(|p| p.rest));
            match param {
                Some(p) if p.optional && !p.rest && item.is_null() => out.push(Value::Undefined),
                Some(p) => out.push(p.fns.json_decode.call(item)?),
                None => out.push(Value::from_json(item)),
            }
        }
        Ok(out)
    }

    /// The arguments as one JSON array.
    pub fn params_stringify(&self, args: &[Value]) -> Result<String, AdapterError> {
        let bound = self.bind(args)?;
        let mut parts = vec!["null".to_string(); args.len()];
        for (i, p, v) in bound {
            parts[i] = p.fns.json_stringify.call(v)?;
        }
        Ok(format!("[{}]", parts.join(",")))
    }

    pub fn params_mock(&self) -> Result<Vec<Value>, CompileError> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        mock_params(&self.rts, &self.function, self.skip, &self.mock_options, &mut rng)
    }

    // ---- return value ------------------------------------------------------

    pub fn return_is_type(&self, v: &Value) -> bool {
        self.ret.is_type.call(v)
    }

    pub fn return_type_errors(&self, v: &Value) -> Vec<ValidationError> {
        self.ret.type_errors.call(v)
    }

    pub fn return_encode(&self, v: &Value) -> Result<serde_json::Value, AdapterError> {
        Ok(self.ret.json_encode.call(v)?)
    }

    pub fn return_decode(&self, json: serde_json::Value) -> Result<Value, AdapterError> {
        Ok(self.ret.json_decode.call(json)?)
    }

    pub fn return_stringify(&self, v: &Value) -> Result<String, AdapterError> {
        Ok(self.ret.json_stringify.call(v)?)
    }

    /// A resolved return value; for promise-returning functions this is the
    /// value the promise resolves to.
    pub fn return_mock(&self) -> Result<Value, CompileError> {
        self.ret_mock.resolved()
    }

    pub fn return_mock_promise(&self) -> Result<MockPromise, CompileError> {
        self.ret_mock.call()
    }
}
