//! ProgramImage: an in-memory program database.
//!
//! A complete implementation of [`ProgramDatabase`] and [`CodeView`] over a
//! set of segments. It backs the object-file loader and every test. Mutations
//! are queued as pending analysis work exactly like a real host would queue
//! auto-analysis; [`ProgramDatabase::wait_for_analysis`] drains the queue. The
//! image counts barriers and reads issued while work was still pending so
//! callers can verify they respect the ordering rule.

use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::trace;

use crate::analysis::database::{CodeView, DatabaseError, ProgramDatabase};
use crate::analysis::flow::build_flow_chart;
use crate::analysis::memory::{ItemSize, MemoryError, MemoryView};
use crate::core::control_flow_graph::FlowChart;
use crate::core::disassembler::Disassembler;
use crate::core::instruction::Instruction;
use crate::core::segment::Segment;
use crate::core::string_literal::{decode_lenient, StringLiteral};

/// What an address range has been typed as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Code,
    Data(ItemSize),
    StringLiteral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Item {
    kind: ItemKind,
    len: u64,
}

/// In-memory program database over a set of segments.
pub struct ProgramImage {
    pointer_size: u8,
    segments: Vec<Segment>,
    items: BTreeMap<u64, Item>,
    names: BTreeMap<u64, String>,
    name_index: HashMap<String, u64>,
    comments: BTreeMap<u64, String>,
    /// Function start -> explicit end (exclusive), if known
    functions: BTreeMap<u64, Option<u64>>,
    /// (to, from)
    data_refs: BTreeSet<(u64, u64)>,
    /// (target, slot) for every pointer-sized data item
    pointer_items: BTreeSet<(u64, u64)>,
    listing: BTreeMap<u64, Instruction>,
    flow_charts: BTreeMap<u64, FlowChart>,
    disassembler: Option<Box<dyn Disassembler + Send + Sync>>,
    pending: usize,
    barriers: usize,
    stale_reads: Cell<usize>,
}

impl ProgramImage {
    pub fn new(pointer_size: u8) -> Self {
        Self {
            pointer_size,
            segments: Vec::new(),
            items: BTreeMap::new(),
            names: BTreeMap::new(),
            name_index: HashMap::new(),
            comments: BTreeMap::new(),
            functions: BTreeMap::new(),
            data_refs: BTreeSet::new(),
            pointer_items: BTreeSet::new(),
            listing: BTreeMap::new(),
            flow_charts: BTreeMap::new(),
            disassembler: None,
            pending: 0,
            barriers: 0,
            stale_reads: Cell::new(0),
        }
    }

    pub fn pointer_size(&self) -> u8 {
        self.pointer_size
    }

    pub fn add_segment(&mut self, segment: Segment) -> &mut Self {
        self.segments.push(segment);
        self.segments.sort_by_key(|s| s.start);
        self
    }

    pub fn set_disassembler(&mut self, disassembler: Box<dyn Disassembler + Send + Sync>) {
        self.disassembler = Some(disassembler);
    }

    /// Pre-decoded instructions; they take precedence over the disassembler.
    pub fn add_instructions(&mut self, insns: impl IntoIterator<Item = Instruction>) -> &mut Self {
        for ins in insns {
            self.listing.insert(ins.address, ins);
        }
        self
    }

    /// Register a flow chart computed elsewhere.
    pub fn add_flow_chart(&mut self, chart: FlowChart) -> &mut Self {
        self.flow_charts.insert(chart.function_start, chart);
        self
    }

    /// Declare an existing function, as if discovered by the host's own analysis.
    pub fn add_function(&mut self, start: u64, end: Option<u64>) -> &mut Self {
        self.functions.insert(start, end);
        self
    }

    /// Name an address without going through the analysis queue.
    pub fn add_name(&mut self, address: u64, name: &str) -> &mut Self {
        self.insert_name(address, name.to_string());
        self
    }

    /// Type an address as data without going through the analysis queue.
    pub fn add_data_item(&mut self, address: u64, size: ItemSize) -> &mut Self {
        self.insert_item(
            address,
            Item {
                kind: ItemKind::Data(size),
                len: size.bytes() as u64,
            },
        );
        self
    }

    /// Kind of the item starting exactly at `address`.
    pub fn item_at(&self, address: u64) -> Option<ItemKind> {
        self.items.get(&address).map(|i| i.kind)
    }

    /// String literal starting at `address`, decoded leniently.
    pub fn string_literal_at(&self, address: u64) -> Option<StringLiteral> {
        let item = self.items.get(&address)?;
        if item.kind != ItemKind::StringLiteral {
            return None;
        }
        let bytes = self.raw_read(address, item.len as usize).ok()?;
        Some(StringLiteral::new(address, item.len, decode_lenient(&bytes)))
    }

    /// All string literals, ascending by address.
    pub fn string_literals(&self) -> Vec<StringLiteral> {
        self.items
            .iter()
            .filter(|(_, i)| i.kind == ItemKind::StringLiteral)
            .filter_map(|(&a, _)| self.string_literal_at(a))
            .collect()
    }

    /// Mutations not yet drained by a barrier.
    pub fn pending_mutations(&self) -> usize {
        self.pending
    }

    /// Number of `wait_for_analysis` calls so far.
    pub fn barrier_count(&self) -> usize {
        self.barriers
    }

    /// Reads issued while mutations were pending.
    pub fn stale_read_count(&self) -> usize {
        self.stale_reads.get()
    }

    fn raw_read(&self, address: u64, len: usize) -> Result<Vec<u8>, MemoryError> {
        let seg = self
            .segments
            .iter()
            .find(|s| s.contains(address))
            .ok_or(MemoryError::Unmapped(address))?;
        seg.read(address, len).ok_or(MemoryError::OutOfRange(address))
    }

    fn is_mapped_range(&self, address: u64, len: u64) -> bool {
        self.segments.iter().any(|s| {
            s.contains(address) && address.saturating_add(len) <= s.end()
        })
    }

    /// Pointer value stored at `address` if it is typed as a pointer-sized item.
    fn pointer_item_target(&self, address: u64, item: &Item) -> Option<u64> {
        let size = ItemSize::for_pointer(self.pointer_size)?;
        if item.kind != ItemKind::Data(size) {
            return None;
        }
        self.raw_read(address, size.bytes()).ok().map(|b| read_le(&b))
    }

    fn insert_item(&mut self, address: u64, item: Item) {
        self.remove_item(address);
        if let Some(target) = self.pointer_item_target(address, &item) {
            self.pointer_items.insert((target, address));
        }
        self.items.insert(address, item);
    }

    fn remove_item(&mut self, address: u64) {
        if let Some(item) = self.items.remove(&address) {
            if let Some(target) = self.pointer_item_target(address, &item) {
                self.pointer_items.remove(&(target, address));
            }
        }
    }

    fn queue(&mut self) {
        self.pending += 1;
    }

    fn insert_name(&mut self, address: u64, name: String) {
        if let Some(old) = self.names.insert(address, name.clone()) {
            self.name_index.remove(&old);
        }
        self.name_index.insert(name, address);
    }

    /// Items overlapping `[address, address + len)`, by start address.
    fn overlapping(&self, address: u64, len: u64) -> Vec<u64> {
        let end = address.saturating_add(len.max(1));
        let mut out = Vec::new();
        if let Some((&start, item)) = self.items.range(..address).next_back() {
            if start.saturating_add(item.len) > address {
                out.push(start);
            }
        }
        out.extend(self.items.range(address..end).map(|(&a, _)| a));
        out
    }

    /// End of the function starting at `start`.
    fn function_end(&self, start: u64) -> Option<u64> {
        let explicit = *self.functions.get(&start)?;
        if let Some(end) = explicit {
            return Some(end);
        }
        if let Some(chart) = self.flow_charts.get(&start) {
            if let Some(end) = chart.blocks.iter().map(|b| b.end_address).max() {
                return Some(end);
            }
        }
        let seg_end = self.segments.iter().find(|s| s.contains(start))?.end();
        let next = self
            .functions
            .range(start.saturating_add(1)..)
            .next()
            .map(|(&a, _)| a)
            .unwrap_or(seg_end);
        Some(next.min(seg_end))
    }

    fn pointer_target_is_mapped(&self, address: u64) -> bool {
        let Some(size) = ItemSize::for_pointer(self.pointer_size) else {
            return false;
        };
        self.raw_read(address, size.bytes())
            .ok()
            .map(|b| read_le(&b))
            .is_some_and(|v| self.segments.iter().any(|s| s.contains(v)))
    }
}

fn read_le(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .rev()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

impl MemoryView for ProgramImage {
    fn read_bytes(&self, address: u64, len: usize) -> Result<Vec<u8>, MemoryError> {
        if self.pending > 0 {
            self.stale_reads.set(self.stale_reads.get() + 1);
            trace!(address = format_args!("{:#x}", address), "read with pending analysis");
        }
        self.raw_read(address, len)
    }
}

impl ProgramDatabase for ProgramImage {
    fn delete_items(&mut self, address: u64, len: u64, expand: bool) -> Result<(), DatabaseError> {
        if !self.is_mapped_range(address, len.max(1)) {
            return Err(DatabaseError::Unmapped(address));
        }
        for start in self.overlapping(address, len) {
            self.remove_item(start);
        }
        if expand {
            let end = address.saturating_add(len.max(1));
            let doomed: Vec<u64> = self.functions.range(address..end).map(|(&a, _)| a).collect();
            for f in doomed {
                self.functions.remove(&f);
            }
        }
        self.queue();
        Ok(())
    }

    fn create_data(&mut self, address: u64, size: ItemSize) -> Result<(), DatabaseError> {
        let len = size.bytes() as u64;
        if !self.is_mapped_range(address, len) {
            return Err(DatabaseError::Unmapped(address));
        }
        if let Some(&existing) = self
            .overlapping(address, len)
            .iter()
            .find(|&&a| a != address)
        {
            return Err(DatabaseError::Conflict { address, existing });
        }
        self.insert_item(
            address,
            Item {
                kind: ItemKind::Data(size),
                len,
            },
        );
        self.queue();
        Ok(())
    }

    fn create_instruction(&mut self, address: u64) -> Result<(), DatabaseError> {
        let executable = self
            .segments
            .iter()
            .any(|s| s.contains(address) && s.perms.is_code());
        if !executable {
            return Err(DatabaseError::NotCode(address));
        }
        let len = self
            .instruction_at(address)
            .map(|i| u64::from(i.length))
            .ok_or(DatabaseError::NotCode(address))?;
        self.insert_item(
            address,
            Item {
                kind: ItemKind::Code,
                len,
            },
        );
        self.queue();
        Ok(())
    }

    fn create_string_literal(&mut self, address: u64, len: u64) -> Result<(), DatabaseError> {
        if len == 0 {
            return Err(DatabaseError::Empty(address));
        }
        if !self.is_mapped_range(address, len) {
            return Err(DatabaseError::Unmapped(address));
        }
        for start in self.overlapping(address, len) {
            self.remove_item(start);
        }
        self.insert_item(
            address,
            Item {
                kind: ItemKind::StringLiteral,
                len,
            },
        );
        self.queue();
        Ok(())
    }

    fn name_at(&self, address: u64) -> Option<String> {
        if let Some(name) = self.names.get(&address) {
            return Some(name.clone());
        }
        if self.functions.contains_key(&address) {
            return Some(format!("sub_{:X}", address));
        }
        match self.items.get(&address)?.kind {
            ItemKind::Data(size)
                if Some(size) == ItemSize::for_pointer(self.pointer_size)
                    && self.pointer_target_is_mapped(address) =>
            {
                Some(format!("off_{:X}", address))
            }
            ItemKind::Data(size) => Some(format!("{}_{:X}", size.label_prefix(), address)),
            ItemKind::StringLiteral => Some(format!("str_{:X}", address)),
            ItemKind::Code => None,
        }
    }

    fn set_name(&mut self, address: u64, name: &str) -> Result<(), DatabaseError> {
        if name.is_empty() || name.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(DatabaseError::InvalidName {
                address,
                name: name.to_string(),
            });
        }
        if !self.segments.iter().any(|s| s.contains(address)) {
            return Err(DatabaseError::Unmapped(address));
        }
        let mut unique = name.to_string();
        let mut n = 0usize;
        while self
            .name_index
            .get(&unique)
            .is_some_and(|&owner| owner != address)
        {
            unique = format!("{}_{}", name, n);
            n += 1;
        }
        self.insert_name(address, unique);
        self.queue();
        Ok(())
    }

    fn address_of_name(&self, name: &str) -> Option<u64> {
        self.name_index.get(name).copied()
    }

    fn set_comment(&mut self, address: u64, comment: &str) {
        if comment.is_empty() {
            self.comments.remove(&address);
        } else {
            self.comments.insert(address, comment.to_string());
        }
    }

    fn comment_at(&self, address: u64) -> Option<String> {
        self.comments.get(&address).cloned()
    }

    fn segments(&self) -> Vec<Segment> {
        self.segments.clone()
    }

    fn segment_by_name(&self, name: &str) -> Option<Segment> {
        self.segments.iter().find(|s| s.name == name).cloned()
    }

    fn segment_at(&self, address: u64) -> Option<Segment> {
        self.segments.iter().find(|s| s.contains(address)).cloned()
    }

    fn segment_name_at(&self, address: u64) -> Option<String> {
        self.segments
            .iter()
            .find(|s| s.contains(address))
            .map(|s| s.name.clone())
    }

    fn functions(&self) -> Vec<u64> {
        self.functions.keys().copied().collect()
    }

    fn function_containing(&self, address: u64) -> Option<u64> {
        let (&start, _) = self.functions.range(..=address).next_back()?;
        let end = self.function_end(start)?;
        (address < end).then_some(start)
    }

    fn create_function(&mut self, address: u64) -> Result<(), DatabaseError> {
        if self.functions.contains_key(&address) {
            return Err(DatabaseError::FunctionExists(address));
        }
        let is_code = self.items.get(&address).map(|i| i.kind) == Some(ItemKind::Code);
        if !is_code {
            return Err(DatabaseError::NotCode(address));
        }
        self.functions.insert(address, None);
        self.queue();
        Ok(())
    }

    fn data_refs_to(&self, address: u64) -> Vec<u64> {
        let refs: BTreeSet<u64> = self
            .data_refs
            .range((address, 0)..=(address, u64::MAX))
            .chain(self.pointer_items.range((address, 0)..=(address, u64::MAX)))
            .map(|&(_, from)| from)
            .collect();
        refs.into_iter().collect()
    }

    fn add_data_ref(&mut self, from: u64, to: u64) {
        self.data_refs.insert((to, from));
        self.queue();
    }

    fn wait_for_analysis(&mut self) {
        self.pending = 0;
        self.barriers += 1;
    }
}

impl CodeView for ProgramImage {
    fn instruction_at(&self, address: u64) -> Option<Instruction> {
        if let Some(ins) = self.listing.get(&address) {
            return Some(ins.clone());
        }
        let dis = self.disassembler.as_ref()?;
        let seg = self.segments.iter().find(|s| s.contains(address))?;
        let avail = (seg.end() - address) as usize;
        let bytes = seg.read(address, avail.min(dis.max_instruction_length()))?;
        dis.disassemble_instruction(address, &bytes).ok()
    }

    fn flow_chart(&self, function_start: u64) -> Option<FlowChart> {
        if let Some(chart) = self.flow_charts.get(&function_start) {
            return Some(chart.clone());
        }
        let end = self.function_end(function_start)?;
        let chart = build_flow_chart(|a| self.instruction_at(a), function_start, end);
        (!chart.is_empty()).then_some(chart)
    }
}
