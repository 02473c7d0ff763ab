//! Binary test-record codec. One record holds the engine invocation
//! arguments, the concrete bytes found for every symbolic object, and the
//! havoced locations with their byte masks. All integers are u32
//! little-endian; masks carry one bit per byte packed into
//! `ceil(num_bytes/32)` words.

use bytes::{Buf, BufMut};
use std::fs;
use std::path::Path;

pub const KTEST_MAGIC: &[u8; 5] = b"KTEST";
pub const KTEST_VERSION: u32 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KTestObject {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KTestHavoc {
    pub name: String,
    pub bytes: Vec<u8>,
    pub mask: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KTest {
    pub args: Vec<String>,
    pub sym_argvs: u32,
    pub sym_argv_len: u32,
    pub objects: Vec<KTestObject>,
    pub havocs: Vec<KTestHavoc>,
}

pub fn mask_words(num_bytes: usize) -> usize {
    (num_bytes + 31) / 32
}

impl KTest {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.put_slice(KTEST_MAGIC);
        buf.put_u32_le(KTEST_VERSION);
        buf.put_u32_le(self.args.len() as u32);
        for arg in self.args.iter() {
            put_string(&mut buf, arg);
        }
        buf.put_u32_le(self.sym_argvs);
        buf.put_u32_le(self.sym_argv_len);
        buf.put_u32_le(self.objects.len() as u32);
        for obj in self.objects.iter() {
            put_string(&mut buf, &obj.name);
            buf.put_u32_le(obj.bytes.len() as u32);
            buf.put_slice(&obj.bytes);
        }
        buf.put_u32_le(self.havocs.len() as u32);
        for havoc in self.havocs.iter() {
            debug_assert!(havoc.mask.len() == mask_words(havoc.bytes.len()));
            put_string(&mut buf, &havoc.name);
            buf.put_u32_le(havoc.bytes.len() as u32);
            buf.put_slice(&havoc.bytes);
            for word in havoc.mask.iter() {
                buf.put_u32_le(*word);
            }
        }
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<KTest, String> {
        let mut cur = data;
        let magic = take_bytes(&mut cur, KTEST_MAGIC.len())?;
        if magic != &KTEST_MAGIC[..] {
            return Err(String::from("not a ktest file"));
        }
        let version = take_u32(&mut cur)?;
        if version != KTEST_VERSION {
            return Err(format!("unsupported ktest version {}", version));
        }
        let num_args = take_u32(&mut cur)? as usize;
        let mut args = Vec::with_capacity(num_args);
        for _ in 0..num_args {
            args.push(take_string(&mut cur)?);
        }
        let sym_argvs = take_u32(&mut cur)?;
        let sym_argv_len = take_u32(&mut cur)?;
        let num_objects = take_u32(&mut cur)? as usize;
        let mut objects = Vec::with_capacity(num_objects);
        for _ in 0..num_objects {
            let name = take_string(&mut cur)?;
            let num_bytes = take_u32(&mut cur)? as usize;
            let bytes = take_bytes(&mut cur, num_bytes)?.to_vec();
            objects.push(KTestObject { name, bytes });
        }
        let num_havocs = take_u32(&mut cur)? as usize;
        let mut havocs = Vec::with_capacity(num_havocs);
        for _ in 0..num_havocs {
            let name = take_string(&mut cur)?;
            let num_bytes = take_u32(&mut cur)? as usize;
            let bytes = take_bytes(&mut cur, num_bytes)?.to_vec();
            let mut mask = Vec::with_capacity(mask_words(num_bytes));
            for _ in 0..mask_words(num_bytes) {
                mask.push(take_u32(&mut cur)?);
            }
            havocs.push(KTestHavoc { name, bytes, mask });
        }
        Ok(KTest {
            args,
            sym_argvs,
            sym_argv_len,
            objects,
            havocs,
        })
    }

    pub fn write_to(&self, path: &Path) -> Result<(), String> {
        fs::write(path, self.to_bytes()).map_err(|_| format!("cannot write test file {}", path.display()))
    }

    pub fn read_from(path: &Path) -> Result<KTest, String> {
        let data = fs::read(path).map_err(|_| format!("cannot read test file {}", path.display()))?;
        Self::from_bytes(&data)
    }
}

fn put_string(buf: &mut Vec<u8>, s: &str) {
    buf.put_u32_le(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

fn take_u32(cur: &mut &[u8]) -> Result<u32, String> {
    if cur.remaining() < 4 {
        return Err(String::from("truncated ktest file"));
    }
    Ok(cur.get_u32_le())
}

fn take_bytes<'a>(cur: &mut &'a [u8], n: usize) -> Result<&'a [u8], String> {
    if cur.len() < n {
        return Err(String::from("truncated ktest file"));
    }
    let (head, tail) = cur.split_at(n);
    *cur = tail;
    Ok(head)
}

fn take_string(cur: &mut &[u8]) -> Result<String, String> {
    let len = take_u32(cur)? as usize;
    let bytes = take_bytes(cur, len)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| String::from("malformed name in ktest file"))
}
