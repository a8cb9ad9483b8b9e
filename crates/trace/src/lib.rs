//! Execution-trace reconstruction: drives a [`JsonRpcProvider`] to fetch a
//! transaction's opcode trace, recovers the call-frame stack so every
//! opcode can be tagged with the address or freshly-created bytecode that
//! executed it, and fetches the address→code map `solcov-coverage` needs
//! for attribution.

pub mod intercept;
pub mod provider;

use alloy_primitives::Address;
use provider::{JsonRpcProvider, StructLog};
use rustc_hash::FxHashMap;
use solcov_common::{Error, Result};

/// One element of the call-frame stack during reconstruction.
#[derive(Debug, Clone)]
enum Frame {
    Address(Address),
    /// A contract whose constructor is still running; carries the
    /// in-flight bytecode rather than a deployed address.
    Bytecode(String),
}

/// The executing context a [`StructLog`] is attributed to — exactly one
/// of `address` or `bytecode`.
#[derive(Debug, Clone)]
pub enum Tag {
    Address(Address),
    Bytecode(String),
}

/// A [`StructLog`] paired with its executing context.
#[derive(Debug, Clone)]
pub struct TaggedLog {
    pub log: StructLog,
    pub tag: Tag,
}

/// The result of reconstructing one transaction's execution: every opcode
/// tagged with its executing context, plus the address→code map collected
/// along the way.
#[derive(Debug, Clone, Default)]
pub struct Trace {
    pub tagged_logs: Vec<TaggedLog>,
    pub address_to_code: FxHashMap<Address, String>,
}

impl Trace {
    /// Fetches `tx_hash`'s trace, reconstructs the call stack, and tags
    /// every opcode with its executing context.
    ///
    /// For a contract-creation transaction (`to` is absent) the initial
    /// frame carries the transaction's `input` as in-flight constructor
    /// bytecode rather than an address — the same representation §4.3
    /// uses for a mid-trace `CREATE`/`CREATE2` — since both describe "code
    /// not yet deployed to an address".
    pub async fn crawl<P: JsonRpcProvider + ?Sized>(provider: &P, tx_hash: &str) -> Result<Self> {
        let tx = provider.get_transaction_by_hash(tx_hash).await?;
        let trace = provider.debug_trace_transaction(tx_hash).await?;
        let logs = &trace.struct_logs;

        let mut stack = vec![match tx.to {
            Some(to) => Frame::Address(to),
            None => Frame::Bytecode(tx.input.clone()),
        }];
        let mut tagged_logs = Vec::with_capacity(logs.len());

        for i in 0..logs.len() {
            let pre = &logs[i];
            let post = logs.get(i + 1);

            let tag = match stack.last().expect("call stack never empties while a tx runs") {
                Frame::Address(address) => Tag::Address(*address),
                Frame::Bytecode(bytecode) => Tag::Bytecode(bytecode.clone()),
            };
            tagged_logs.push(TaggedLog { log: pre.clone(), tag });

            match pre.op.as_str() {
                "CALL" | "CALLCODE" | "DELEGATECALL" | "STATICCALL" => {
                    if post.is_some_and(|p| p.depth == pre.depth + 1) {
                        let address = stack_address_from_top(pre, 1)?;
                        stack.push(Frame::Address(address));
                    }
                }
                "CREATE" | "CREATE2" => {
                    if !post.is_some_and(|p| p.depth == pre.depth + 1) {
                        return Err(Error::TraceInconsistency(format!(
                            "{} at pc {} did not increase call depth",
                            pre.op, pre.pc
                        )));
                    }
                    let offset = stack_usize_from_top(pre, 1)?;
                    let length = stack_usize_from_top(pre, 2)?;
                    let bytecode = memory_slice(&pre.memory, offset, length);
                    stack.push(Frame::Bytecode(bytecode));
                }
                _ => {
                    let depth_ok = post.map_or(true, |p| p.depth <= pre.depth);
                    if !depth_ok {
                        return Err(Error::TraceInconsistency(format!(
                            "{} at pc {} unexpectedly increased call depth",
                            pre.op, pre.pc
                        )));
                    }
                    if post.is_some_and(|p| p.depth < pre.depth) && stack.len() > 1 {
                        stack.pop();
                    }
                }
            }
        }

        let mut address_to_code = FxHashMap::default();
        for tagged in &tagged_logs {
            if let Tag::Address(address) = tagged.tag {
                address_to_code.entry(address).or_insert(String::new());
            }
        }
        for (address, slot) in address_to_code.iter_mut() {
            *slot = solcov_common::hex::normalize(&provider.get_code(*address).await?);
        }

        Ok(Self { tagged_logs, address_to_code })
    }
}

/// The 32-byte stack word `n` positions from the top (0 = top), read from
/// `log`'s pre-opcode stack (listed bottom-to-top).
fn stack_from_top<'a>(log: &'a StructLog, n: usize) -> Result<&'a str> {
    let len = log.stack.len();
    len.checked_sub(n + 1)
        .and_then(|idx| log.stack.get(idx))
        .map(String::as_str)
        .ok_or_else(|| Error::TraceInconsistency(format!("stack underflow reading {n} from top at pc {}", log.pc)))
}

/// The low 20 bytes of the word `n` positions from the stack top, as an
/// [`Address`] — the callee address argument of a `CALL`-family opcode.
fn stack_address_from_top(log: &StructLog, n: usize) -> Result<Address> {
    let word = stack_from_top(log, n)?;
    let normalized = solcov_common::hex::normalize(word);
    let padded = format!("{normalized:0>64}");
    let low20 = &padded[padded.len() - 40..];
    let bytes = solcov_common::hex::decode(low20)
        .ok_or_else(|| Error::TraceInconsistency(format!("malformed stack word {word}")))?;
    Ok(Address::from_slice(&bytes))
}

/// The word `n` positions from the stack top, as a `usize` byte offset or
/// length argument.
fn stack_usize_from_top(log: &StructLog, n: usize) -> Result<usize> {
    let word = stack_from_top(log, n)?;
    usize::from_str_radix(solcov_common::hex::normalize(word).trim_start_matches('0'), 16)
        .or(Ok(0))
}

/// Treats `memory` (a list of 32-byte hex words) as one concatenated hex
/// string and slices out the byte range `[offset, offset + length)`.
fn memory_slice(memory: &[String], offset: usize, length: usize) -> String {
    let concatenated: String = memory.iter().map(|w| solcov_common::hex::normalize(w)).collect();
    let start = (offset * 2).min(concatenated.len());
    let end = ((offset + length) * 2).min(concatenated.len());
    concatenated[start..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::RecordedProvider;
    use alloy_primitives::address;

    fn log(depth: u64, op: &str, pc: usize, stack: Vec<&str>) -> StructLog {
        StructLog {
            depth,
            op: op.to_string(),
            pc,
            stack: stack.into_iter().map(String::from).collect(),
            memory: vec![],
        }
    }

    /// Scenario (g): `CALL` (depth 1→2) then `RETURN` (depth 2→1) yields
    /// two tagged logs for the callee's address and resumes the caller's
    /// frame afterwards.
    #[tokio::test]
    async fn call_then_return_tags_callee_and_resumes_caller() {
        let caller = address!("1111111111111111111111111111111111111111");
        let callee = address!("2222222222222222222222222222222222222222");

        let callee_word = format!("{callee:x}");
        // Stack is listed bottom-to-top; CALL pops gas (top), addr, value,
        // argsOffset, argsLength, retOffset, retLength (bottom), so the
        // callee address sits one slot below the top.
        let logs = vec![
            log(1, "CALL", 0, vec!["0", "0", "0", "0", "0", &callee_word, "0"]),
            log(2, "PUSH1", 0, vec![]),
            log(2, "RETURN", 2, vec!["0", "0"]),
            log(1, "STOP", 10, vec![]),
        ];

        let provider = RecordedProvider::new()
            .with_transaction("0xabc", Some(caller), "")
            .with_trace("0xabc", logs)
            .with_code(caller, "6000")
            .with_code(callee, "6001");

        let trace = Trace::crawl(&provider, "0xabc").await.unwrap();
        assert_eq!(trace.tagged_logs.len(), 4);
        assert!(matches!(trace.tagged_logs[0].tag, Tag::Address(a) if a == caller));
        assert!(matches!(trace.tagged_logs[1].tag, Tag::Address(a) if a == callee));
        assert!(matches!(trace.tagged_logs[2].tag, Tag::Address(a) if a == callee));
        assert!(matches!(trace.tagged_logs[3].tag, Tag::Address(a) if a == caller));

        assert_eq!(trace.address_to_code[&caller], "6000");
        assert_eq!(trace.address_to_code[&callee], "6001");
    }

    #[tokio::test]
    async fn create_without_depth_increase_is_trace_inconsistency() {
        let creator = address!("3333333333333333333333333333333333333333");
        let logs = vec![
            log(1, "CREATE", 0, vec!["0", "0", "0"]),
            log(1, "STOP", 1, vec![]),
        ];
        let provider = RecordedProvider::new()
            .with_transaction("0xdef", Some(creator), "")
            .with_trace("0xdef", logs);

        let result = Trace::crawl(&provider, "0xdef").await;
        assert!(matches!(result, Err(Error::TraceInconsistency(_))));
    }

    #[tokio::test]
    async fn contract_creation_transaction_tags_with_input_bytecode() {
        let logs = vec![log(1, "STOP", 0, vec![])];
        let provider = RecordedProvider::new()
            .with_transaction("0x1", None, "6080604052")
            .with_trace("0x1", logs);

        let trace = Trace::crawl(&provider, "0x1").await.unwrap();
        assert!(matches!(&trace.tagged_logs[0].tag, Tag::Bytecode(b) if b == "6080604052"));
    }
}
