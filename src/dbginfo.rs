//! DWARF and ELF queries: the debug-info side of the debugger.
//!
//! [`DebugInfo::build`] parses the executable once, up front, into owned
//! per-unit tables: function DIEs with their PC ranges and the line table in
//! ascending address order. Every later query is a scan over those tables,
//! so nothing here borrows from the object file after construction.

use std::fmt::Display;
use std::path::PathBuf;
use std::rc::Rc;

use gimli::{Attribute, AttributeValue, Reader, Unit};
use gimli::{DW_AT_high_pc, DW_AT_low_pc, DW_AT_name, DW_TAG_compile_unit, DW_TAG_subprogram};
use object::{Object, ObjectSection, ObjectSymbol};
use tracing::debug;

use crate::errors::{DebuggerError, Result};
use crate::Addr;

// the gimli::Reader we use
pub(crate) type GimliReader = gimli::EndianRcSlice<gimli::NativeEndian>;

/// ELF symbol kinds the `symbol` command reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    NoType,
    Object,
    Func,
    Section,
    File,
}

impl From<object::SymbolKind> for SymbolKind {
    fn from(kind: object::SymbolKind) -> Self {
        match kind {
            object::SymbolKind::Text => SymbolKind::Func,
            object::SymbolKind::Data => SymbolKind::Object,
            object::SymbolKind::Section => SymbolKind::Section,
            object::SymbolKind::File => SymbolKind::File,
            _ => SymbolKind::NoType,
        }
    }
}

impl Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SymbolKind::NoType => "notype",
            SymbolKind::Object => "object",
            SymbolKind::Func => "func",
            SymbolKind::Section => "section",
            SymbolKind::File => "file",
        };
        write!(f, "{name}")
    }
}

/// One entry of the ELF symbol tables.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub kind: SymbolKind,
    pub name: String,
    pub addr: Addr,
}

impl Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.name, self.kind, self.addr)
    }
}

/// One row of a compilation unit's line table.
#[derive(Debug, Clone)]
pub struct LineEntry {
    pub addr: Addr,
    pub file: PathBuf,
    pub line: u64,
    pub is_stmt: bool,
}

/// A `DW_TAG_subprogram` DIE reduced to what the stepper needs.
#[derive(Debug, Clone)]
pub struct FunctionDie {
    pub name: Option<String>,
    pub low_pc: Option<Addr>,
    pub high_pc: Option<Addr>,
}

impl FunctionDie {
    pub fn contains(&self, pc: Addr) -> bool {
        self.low_pc.is_some_and(|low| low <= pc) && self.high_pc.is_some_and(|high| pc < high)
    }
}

/// One compilation unit: root range, subprograms, line table.
#[derive(Debug, Clone)]
pub struct UnitInfo {
    pub name: Option<String>,
    pub low_pc: Option<Addr>,
    pub high_pc: Option<Addr>,
    pub functions: Vec<FunctionDie>,
    pub lines: Vec<LineEntry>,
}

impl UnitInfo {
    /// Whether the unit's root PC range covers `pc`. A unit without a
    /// recorded range answers via its line table instead of being skipped.
    fn covers(&self, pc: Addr) -> bool {
        match (self.low_pc, self.high_pc) {
            (Some(low), Some(high)) => low <= pc && pc < high,
            _ => {
                self.lines.first().is_some_and(|first| first.addr <= pc)
                    && self.lines.last().is_some_and(|last| pc <= last.addr)
            }
        }
    }
}

/// All debug information of the executable, parsed once at launch.
pub struct DebugInfo {
    units: Vec<UnitInfo>,
    symbols: Vec<Symbol>,
}

impl DebugInfo {
    /// Parses the DWARF units and ELF symbol tables of `obj`.
    pub fn build(obj: &object::File<'_>) -> Result<Self> {
        let loader = |section: gimli::SectionId| -> std::result::Result<GimliReader, gimli::Error> {
            let data = obj
                .section_by_name(section.name())
                .and_then(|s| s.uncompressed_data().ok())
                .unwrap_or_default();
            Ok(GimliReader::new(Rc::from(data.as_ref()), gimli::NativeEndian))
        };
        let dwarf = gimli::Dwarf::load(loader)?;

        let mut units = Vec::new();
        let mut iter = dwarf.units();
        while let Some(header) = iter.next()? {
            let unit = dwarf.unit(header)?;
            units.push(Self::parse_unit(&dwarf, &unit)?);
        }
        debug!("parsed {} compilation units", units.len());

        let mut symbols = Vec::new();
        for sym in obj.symbols().chain(obj.dynamic_symbols()) {
            let Ok(name) = sym.name() else { continue };
            if name.is_empty() {
                continue;
            }
            symbols.push(Symbol {
                kind: sym.kind().into(),
                name: name.to_string(),
                addr: Addr::from(sym.address()),
            });
        }

        Ok(Self { units, symbols })
    }

    fn parse_unit(dwarf: &gimli::Dwarf<GimliReader>, unit: &Unit<GimliReader>) -> Result<UnitInfo> {
        let mut name = None;
        let mut low_pc = None;
        let mut high_pc = None;
        let mut functions = Vec::new();

        let mut entries = unit.entries();
        while let Some((_, entry)) = entries.next_dfs()? {
            match entry.tag() {
                DW_TAG_compile_unit => {
                    name = Self::parse_string(dwarf, unit, entry.attr(DW_AT_name)?)?;
                    low_pc = Self::parse_addr_low(dwarf, unit, entry.attr(DW_AT_low_pc)?)?;
                    high_pc = Self::parse_addr_high(entry.attr(DW_AT_high_pc)?, low_pc)?;
                }
                DW_TAG_subprogram => {
                    let f_low = Self::parse_addr_low(dwarf, unit, entry.attr(DW_AT_low_pc)?)?;
                    let f_high = Self::parse_addr_high(entry.attr(DW_AT_high_pc)?, f_low)?;
                    functions.push(FunctionDie {
                        name: Self::parse_string(dwarf, unit, entry.attr(DW_AT_name)?)?,
                        low_pc: f_low,
                        high_pc: f_high,
                    });
                }
                _ => (),
            }
        }

        let lines = Self::parse_line_table(dwarf, unit)?;
        Ok(UnitInfo {
            name,
            low_pc,
            high_pc,
            functions,
            lines,
        })
    }

    fn parse_string(
        dwarf: &gimli::Dwarf<GimliReader>,
        unit: &Unit<GimliReader>,
        attribute: Option<Attribute<GimliReader>>,
    ) -> Result<Option<String>> {
        Ok(match attribute {
            Some(a) => Some(
                dwarf
                    .attr_string(unit, a.value())?
                    .to_string_lossy()?
                    .to_string(),
            ),
            None => None,
        })
    }

    fn parse_addr_low(
        dwarf: &gimli::Dwarf<GimliReader>,
        unit: &Unit<GimliReader>,
        attribute: Option<Attribute<GimliReader>>,
    ) -> Result<Option<Addr>> {
        Ok(match attribute {
            Some(a) => dwarf.attr_address(unit, a.value())?.map(Addr::from),
            None => None,
        })
    }

    /// `DW_AT_high_pc` is either an absolute address or an offset from
    /// `DW_AT_low_pc`.
    fn parse_addr_high(
        attribute: Option<Attribute<GimliReader>>,
        low_pc: Option<Addr>,
    ) -> Result<Option<Addr>> {
        Ok(match attribute {
            None => None,
            Some(a) => match a.value() {
                AttributeValue::Addr(v) => Some(Addr::from(v)),
                AttributeValue::Udata(offset) => match low_pc {
                    Some(low) => Some(low + offset as usize),
                    None => return Err(DebuggerError::HighAddrExistsButNotLowAddr),
                },
                _ => None,
            },
        })
    }

    fn parse_line_table(
        dwarf: &gimli::Dwarf<GimliReader>,
        unit: &Unit<GimliReader>,
    ) -> Result<Vec<LineEntry>> {
        let mut lines = Vec::new();
        let Some(program) = unit.line_program.clone() else {
            return Ok(lines);
        };

        let comp_dir: Option<PathBuf> = match &unit.comp_dir {
            Some(d) => Some(PathBuf::from(d.to_string_lossy()?.to_string())),
            None => None,
        };

        let mut rows = program.rows();
        while let Some((header, row)) = rows.next_row()? {
            if row.end_sequence() {
                continue;
            }
            let Some(line) = row.line() else { continue };
            let Some(file) = row.file(header) else { continue };

            let mut path = PathBuf::new();
            if let Some(dir) = file.directory(header) {
                path.push(dwarf.attr_string(unit, dir)?.to_string_lossy()?.to_string());
            }
            path.push(
                dwarf
                    .attr_string(unit, file.path_name())?
                    .to_string_lossy()?
                    .to_string(),
            );
            if path.is_relative() {
                if let Some(cd) = &comp_dir {
                    path = cd.join(path);
                }
            }

            lines.push(LineEntry {
                addr: Addr::from(row.address()),
                file: path,
                line: line.get(),
                is_stmt: row.is_stmt(),
            });
        }

        lines.sort_by_key(|e| e.addr);
        Ok(lines)
    }

    pub fn units(&self) -> &[UnitInfo] {
        &self.units
    }

    /// The function DIE whose PC range contains `pc`. First match in unit
    /// order wins.
    pub fn function_by_addr(&self, pc: Addr) -> Option<&FunctionDie> {
        self.units
            .iter()
            .flat_map(|unit| &unit.functions)
            .find(|f| f.contains(pc))
    }

    /// The line entry covering `pc`: within the unit whose root range
    /// contains `pc`, the last entry at or below it.
    pub fn line_entry_by_addr(&self, pc: Addr) -> Result<&LineEntry> {
        for unit in &self.units {
            if !unit.covers(pc) {
                continue;
            }
            let idx = unit.lines.partition_point(|e| e.addr <= pc);
            if idx == 0 {
                continue;
            }
            return Ok(&unit.lines[idx - 1]);
        }
        Err(DebuggerError::NoLineEntry(pc))
    }

    /// The first statement entry with this line number whose recorded file
    /// path equals `file` exactly. No canonicalization.
    pub fn line_entry_for_line(&self, file: &str, line: u64) -> Option<&LineEntry> {
        self.units
            .iter()
            .flat_map(|unit| &unit.lines)
            .find(|e| e.is_stmt && e.line == line && e.file.as_os_str() == file)
    }

    /// Like [`Self::line_entry_for_line`], but matching `file` as a path
    /// suffix of the recorded path, so `break hello.c:5` works without the
    /// compilation directory.
    pub fn line_entry_for_line_suffix(&self, file: &str, line: u64) -> Option<&LineEntry> {
        self.units
            .iter()
            .flat_map(|unit| &unit.lines)
            .find(|e| e.is_stmt && e.line == line && e.file.ends_with(file))
    }

    /// Prologue-skipped entry addresses of every function DIE named `name`.
    pub fn function_entry_addrs(&self, name: &str) -> Vec<Addr> {
        let mut out = Vec::new();
        for unit in &self.units {
            for function in &unit.functions {
                if function.name.as_deref() != Some(name) {
                    continue;
                }
                let Some(low) = function.low_pc else { continue };
                if let Some(addr) = skip_prologue(&unit.lines, low) {
                    out.push(addr);
                }
            }
        }
        out
    }

    /// All `.symtab`/`.dynsym` entries named `name`, scanned per request.
    pub fn symbols_by_name(&self, name: &str) -> Vec<Symbol> {
        self.symbols
            .iter()
            .filter(|s| s.name == name)
            .cloned()
            .collect()
    }
}

/// The address one line entry past the entry containing `low`, i.e. the
/// first statement after the function prologue.
fn skip_prologue(lines: &[LineEntry], low: Addr) -> Option<Addr> {
    let idx = lines.partition_point(|e| e.addr <= low);
    if idx == 0 {
        return None;
    }
    lines.get(idx).map(|e| e.addr)
}
