//! Fluent builders for command trees.
//!
//! A [`Proxy`] wraps a [`Command`] and extends it one step at a time.
//! Nothing is executed; the finished command is handed to a session.
//!
//! ```
//! use jsproxy::{HostValue, Proxy};
//! use serde_json::json;
//!
//! let call = Proxy::window()
//!     .attr("document")
//!     .attr("getElementById")
//!     .call(vec![HostValue::from("out")])
//!     .unwrap();
//! assert_eq!(
//!     call.to_wire(),
//!     json!(["method", ["get", ["window"], "document"], "getElementById", "out"])
//! );
//! ```

use crate::codec::{encode, HostValue};
use crate::error::ProxyError;
use jsproxy_command::{to_javascript, Command, CommandError};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct Proxy {
    command: Command,
}

impl Proxy {
    /// The remote global namespace.
    pub fn window() -> Self {
        Proxy::from(Command::window())
    }

    /// The remote host element.
    pub fn element() -> Self {
        Proxy::from(Command::element())
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn into_command(self) -> Command {
        self.command
    }

    /// `self[name]`.
    pub fn attr(&self, name: &str) -> Proxy {
        self.item(name)
    }

    /// `self[key]` for a computed key.
    pub fn item(&self, key: impl Into<Command>) -> Proxy {
        Proxy::from(Command::get(self.command.clone(), key))
    }

    /// Invokes this node.
    ///
    /// A `self[name]` node becomes a method call with `self` bound as `this`;
    /// any other non-root node becomes a plain function application, which
    /// is how `a.b(x)(y)` chains are expressed. Roots cannot be invoked.
    pub fn call(&self, args: Vec<HostValue>) -> Result<Proxy, ProxyError> {
        let args = encode_args(&args)?;
        let command = match &self.command {
            Command::Root(_) => return Err(ProxyError::RootNotCallable),
            Command::Get { target, key } => match key.as_ref() {
                Command::Literal(Value::String(name)) => {
                    Command::call(target.as_ref().clone(), name.clone(), args)
                }
                other => {
                    return Err(CommandError::InvalidCommand(format!(
                        "method name must be a string, got {}",
                        other.to_wire()
                    ))
                    .into())
                }
            },
            callee => Command::apply(callee.clone(), args),
        };
        Ok(Proxy::from(command))
    }

    /// `self[name](...args)`.
    pub fn method(&self, name: &str, args: Vec<HostValue>) -> Result<Proxy, ProxyError> {
        self.attr(name).call(args)
    }

    /// `self[key] = value`. The resulting node evaluates to `self`, so the
    /// chain can continue from it.
    pub fn set(&self, key: &str, value: impl Into<HostValue>) -> Result<Proxy, ProxyError> {
        let value = encode(&value.into())?;
        Ok(Proxy::from(Command::set(self.command.clone(), key, value)))
    }

    /// `new self(...args)`.
    pub fn construct(&self, args: Vec<HostValue>) -> Result<Proxy, ProxyError> {
        let args = encode_args(&args)?;
        Ok(Proxy::from(Command::new_object(self.command.clone(), args)))
    }

    /// Evaluates this node remotely and drops the result.
    pub fn discard(&self) -> Proxy {
        Proxy::from(Command::discard(self.command.clone()))
    }

    pub fn to_wire(&self) -> Value {
        self.command.to_wire()
    }

    pub fn javascript(&self, level: usize) -> String {
        to_javascript(&self.command, level)
    }
}

fn encode_args(args: &[HostValue]) -> Result<Vec<Command>, ProxyError> {
    Ok(args.iter().map(encode).collect::<Result<_, _>>()?)
}

impl From<Command> for Proxy {
    fn from(command: Command) -> Self {
        Proxy { command }
    }
}

impl From<Proxy> for Command {
    fn from(proxy: Proxy) -> Self {
        proxy.command
    }
}

impl From<Proxy> for HostValue {
    fn from(proxy: Proxy) -> Self {
        HostValue::Command(proxy.command)
    }
}

impl From<&Proxy> for HostValue {
    fn from(proxy: &Proxy) -> Self {
        HostValue::Command(proxy.command.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::Callable;
    use serde_json::json;

    #[test]
    fn roots_cannot_be_called() {
        assert!(matches!(Proxy::window().call(vec![]), Err(ProxyError::RootNotCallable)));
        assert!(matches!(Proxy::element().call(vec![1.into()]), Err(ProxyError::RootNotCallable)));
    }

    #[test]
    fn attribute_then_call_is_a_method_call() {
        let p = Proxy::window().method("parseInt", vec!["42".into()]).unwrap();
        assert_eq!(p.to_wire(), json!(["method", ["window"], "parseInt", "42"]));
    }

    #[test]
    fn calling_a_call_is_an_application() {
        let p = Proxy::window()
            .method("f", vec![])
            .unwrap()
            .call(vec![1.into(), vec![2, 3].into()])
            .unwrap();
        assert_eq!(
            p.to_wire(),
            json!(["function", ["method", ["window"], "f"], 1, ["list", 2, 3]])
        );
    }

    #[test]
    fn computed_keys_cannot_name_methods() {
        let p = Proxy::element().item(Command::literal(0));
        let err = p.call(vec![]).unwrap_err();
        assert!(err.is_local());
        assert!(err.to_string().contains("method name must be a string"));
    }

    #[test]
    fn set_chains_from_the_target() {
        let p = Proxy::element()
            .set("x", 5)
            .unwrap()
            .method("html", vec!["hi".into()])
            .unwrap();
        assert_eq!(
            p.to_wire(),
            json!(["method", ["set", ["element"], "x", 5], "html", "hi"])
        );
    }

    #[test]
    fn construct_and_discard() {
        let p = Proxy::window().attr("Date").construct(vec![2020.into()]).unwrap().discard();
        assert_eq!(p.to_wire(), json!(["null", ["new", ["get", ["window"], "Date"], 2020]]));
    }

    #[test]
    fn proxies_nest_inside_arguments() {
        let doc = Proxy::window().attr("document");
        let p = Proxy::element().method("append", vec![(&doc).into()]).unwrap();
        assert_eq!(
            p.to_wire(),
            json!(["method", ["element"], "append", ["get", ["window"], "document"]])
        );
    }

    #[test]
    fn unregistered_callables_are_rejected() {
        let c = Callable::new("click", |_| Ok(()));
        let err = Proxy::element().method("on", vec![c.into()]).unwrap_err();
        assert!(matches!(err, ProxyError::Command(CommandError::UntranslatableValue { .. })));
    }
}
