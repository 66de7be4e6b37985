//! The `store:` module: command history and directory history.
//!
//! The store itself lives elsewhere (usually a daemon); the evaluator only
//! sees the [`Store`] trait. [`MemoryStore`] keeps everything in memory for
//! tests and for sessions without a daemon.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::builtins::{Builtin, CallArgs};
use crate::eval::{ExecResult, Exception, Frame, Ns, NsBuilder, Value};
use crate::num::Num;

/// Multiplier applied to every directory score when any directory is added.
pub const DIR_SCORE_DECAY: f64 = 0.986;

/// Added to a directory's score each time it is added with factor 1.
pub const DIR_SCORE_INCREMENT: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("no such command: {0}")]
    NoSuchCommand(i64),

    #[error("no such directory: {0}")]
    NoSuchDir(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A command history entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Cmd {
    pub seq: i64,
    pub text: String,
}

/// A directory history entry. Higher scores were visited more, more recently.
#[derive(Debug, Clone, PartialEq)]
pub struct Dir {
    pub path: String,
    pub score: f64,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// The sequence number the next added command will get.
    async fn next_cmd_seq(&self) -> Result<i64, StoreError>;

    async fn add_cmd(&self, text: &str) -> Result<i64, StoreError>;

    async fn del_cmd(&self, seq: i64) -> Result<(), StoreError>;

    async fn cmd(&self, seq: i64) -> Result<String, StoreError>;

    /// Commands with `from <= seq < upto`, oldest first.
    async fn cmds(&self, from: i64, upto: i64) -> Result<Vec<Cmd>, StoreError>;

    async fn add_dir(&self, dir: &str, inc_factor: f64) -> Result<(), StoreError>;

    async fn del_dir(&self, dir: &str) -> Result<(), StoreError>;

    /// Directories not in `blacklist`, highest score first.
    async fn dirs(&self, blacklist: &HashSet<String>) -> Result<Vec<Dir>, StoreError>;
}

#[derive(Default)]
struct History {
    cmds: BTreeMap<i64, String>,
    next_seq: i64,
    dirs: HashMap<String, f64>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<History>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn next_cmd_seq(&self) -> Result<i64, StoreError> {
        Ok(self.inner.lock().await.next_seq)
    }

    async fn add_cmd(&self, text: &str) -> Result<i64, StoreError> {
        let mut h = self.inner.lock().await;
        let seq = h.next_seq;
        h.cmds.insert(seq, text.to_string());
        h.next_seq += 1;
        Ok(seq)
    }

    async fn del_cmd(&self, seq: i64) -> Result<(), StoreError> {
        let mut h = self.inner.lock().await;
        h.cmds.remove(&seq).map(|_| ()).ok_or(StoreError::NoSuchCommand(seq))
    }

    async fn cmd(&self, seq: i64) -> Result<String, StoreError> {
        let h = self.inner.lock().await;
        h.cmds.get(&seq).cloned().ok_or(StoreError::NoSuchCommand(seq))
    }

    async fn cmds(&self, from: i64, upto: i64) -> Result<Vec<Cmd>, StoreError> {
        if from >= upto {
            return Ok(Vec::new());
        }
        let h = self.inner.lock().await;
        Ok(h.cmds
            .range(from..upto)
            .map(|(seq, text)| Cmd {
                seq: *seq,
                text: text.clone(),
            })
            .collect())
    }

    async fn add_dir(&self, dir: &str, inc_factor: f64) -> Result<(), StoreError> {
        let mut h = self.inner.lock().await;
        for score in h.dirs.values_mut() {
            *score *= DIR_SCORE_DECAY;
        }
        *h.dirs.entry(dir.to_string()).or_insert(0.0) += DIR_SCORE_INCREMENT * inc_factor;
        Ok(())
    }

    async fn del_dir(&self, dir: &str) -> Result<(), StoreError> {
        let mut h = self.inner.lock().await;
        h.dirs
            .remove(dir)
            .map(|_| ())
            .ok_or_else(|| StoreError::NoSuchDir(dir.to_string()))
    }

    async fn dirs(&self, blacklist: &HashSet<String>) -> Result<Vec<Dir>, StoreError> {
        let h = self.inner.lock().await;
        let mut dirs: Vec<Dir> = h
            .dirs
            .iter()
            .filter(|(path, _)| !blacklist.contains(*path))
            .map(|(path, score)| Dir {
                path: path.clone(),
                score: *score,
            })
            .collect();
        dirs.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.path.cmp(&b.path)));
        Ok(dirs)
    }
}

/// The `store` namespace over `store`.
pub fn ns(store: Arc<dyn Store>) -> Ns {
    NsBuilder::new("store")
        .add_fn(StoreFn::new("next-cmd-seq", StoreOp::NextCmdSeq, &store))
        .add_fn(StoreFn::new("add-cmd", StoreOp::AddCmd, &store))
        .add_fn(StoreFn::new("del-cmd", StoreOp::DelCmd, &store))
        .add_fn(StoreFn::new("cmd", StoreOp::Cmd, &store))
        .add_fn(StoreFn::new("cmds", StoreOp::Cmds, &store))
        .add_fn(StoreFn::new("add-dir", StoreOp::AddDir, &store))
        .add_fn(StoreFn::new("del-dir", StoreOp::DelDir, &store))
        .add_fn(StoreFn::new("dirs", StoreOp::Dirs, &store))
        .build()
}

#[derive(Debug, Clone, Copy)]
enum StoreOp {
    NextCmdSeq,
    AddCmd,
    DelCmd,
    Cmd,
    Cmds,
    AddDir,
    DelDir,
    Dirs,
}

struct StoreFn {
    name: &'static str,
    op: StoreOp,
    store: Arc<dyn Store>,
}

impl StoreFn {
    fn new(name: &'static str, op: StoreOp, store: &Arc<dyn Store>) -> Self {
        Self {
            name,
            op,
            store: store.clone(),
        }
    }
}

fn failed(e: StoreError) -> Exception {
    Exception::fail(e.to_string())
}

fn cmd_map(c: Cmd) -> Value {
    let mut m = BTreeMap::new();
    m.insert("seq".to_string(), Value::from(c.seq));
    m.insert("text".to_string(), Value::Str(c.text));
    Value::map(m)
}

fn dir_map(d: Dir) -> Value {
    let mut m = BTreeMap::new();
    m.insert("path".to_string(), Value::Str(d.path));
    m.insert("score".to_string(), Value::Num(Num::Float(d.score)));
    Value::map(m)
}

#[async_trait]
impl Builtin for StoreFn {
    fn name(&self) -> &str {
        self.name
    }

    async fn call(&self, frame: &Frame, args: CallArgs) -> ExecResult<()> {
        let store = self.store.as_ref();
        match self.op {
            StoreOp::NextCmdSeq => {
                args.arity(0, Some(0))?;
                let seq = store.next_cmd_seq().await.map_err(failed)?;
                frame.put(Value::from(seq)).await
            }
            StoreOp::AddCmd => {
                args.arity(1, Some(1))?;
                let seq = store.add_cmd(&args.args[0].to_str()).await.map_err(failed)?;
                frame.put(Value::from(seq)).await
            }
            StoreOp::DelCmd => {
                args.arity(1, Some(1))?;
                store.del_cmd(args.args[0].as_int("seq")?).await.map_err(failed)
            }
            StoreOp::Cmd => {
                args.arity(1, Some(1))?;
                let text = store.cmd(args.args[0].as_int("seq")?).await.map_err(failed)?;
                frame.put(Value::Str(text)).await
            }
            StoreOp::Cmds => {
                args.arity(2, Some(2))?;
                let from = args.args[0].as_int("from")?;
                let upto = args.args[1].as_int("upto")?;
                for c in store.cmds(from, upto).await.map_err(failed)? {
                    frame.put(cmd_map(c)).await?;
                }
                Ok(())
            }
            StoreOp::AddDir => {
                args.arity(1, Some(1))?;
                args.only_opts(&["factor"])?;
                let factor = match args.opt("factor") {
                    Some(v) => v.as_num()?.to_f64(),
                    None => 1.0,
                };
                store.add_dir(&args.args[0].to_str(), factor).await.map_err(failed)
            }
            StoreOp::DelDir => {
                args.arity(1, Some(1))?;
                store.del_dir(&args.args[0].to_str()).await.map_err(failed)
            }
            StoreOp::Dirs => {
                args.arity(0, Some(0))?;
                args.only_opts(&["blacklist"])?;
                let blacklist = match args.opt("blacklist") {
                    Some(v) => v.iterate()?.iter().map(Value::to_str).collect(),
                    None => HashSet::new(),
                };
                for d in store.dirs(&blacklist).await.map_err(failed)? {
                    frame.put(dir_map(d)).await?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Evaler;

    #[tokio::test]
    async fn memory_store_history() {
        let s = MemoryStore::new();
        assert_eq!(s.add_cmd("echo a").await.unwrap(), 0);
        assert_eq!(s.add_cmd("echo b").await.unwrap(), 1);
        assert_eq!(s.next_cmd_seq().await.unwrap(), 2);
        s.del_cmd(0).await.unwrap();
        assert_eq!(s.cmd(0).await, Err(StoreError::NoSuchCommand(0)));
        let cmds = s.cmds(0, 10).await.unwrap();
        assert_eq!(cmds, vec![Cmd { seq: 1, text: "echo b".into() }]);
    }

    #[tokio::test]
    async fn dir_scores_decay() {
        let s = MemoryStore::new();
        s.add_dir("/a", 1.0).await.unwrap();
        s.add_dir("/b", 1.0).await.unwrap();
        let dirs = s.dirs(&HashSet::new()).await.unwrap();
        assert_eq!(dirs[0].path, "/b");
        assert_eq!(dirs[1].score, DIR_SCORE_INCREMENT * DIR_SCORE_DECAY);
        let only_a = s.dirs(&HashSet::from(["/b".to_string()])).await.unwrap();
        assert_eq!(only_a.len(), 1);
    }

    #[tokio::test]
    async fn module_functions() {
        let ev = Evaler::transient();
        ev.add_module(ns(Arc::new(MemoryStore::new())));
        let out = ev
            .eval_capture(
                "t",
                "use store; store:add-cmd 'ls -l'; store:cmd 0; store:add-dir /tmp; store:dirs",
            )
            .await;
        out.result.unwrap();
        let reprs: Vec<String> = out.values.iter().map(Value::repr).collect();
        assert_eq!(reprs, ["(num 0)", "'ls -l'", "[&path=/tmp &score=(num 10.0)]"]);
    }
}
