//! Pre-validated capability modules for the fixed categories.

/// Tabular rows kept in state and persisted as CSV in the workspace.
pub const SPREADSHEET: &str = r#"
// Spreadsheet capability: rows of maps persisted as CSV files.

fn create() {
    #{ current_file: "", rows: [], columns: [], loaded: false }
}

private fn _join(items, sep) {
    let out = "";
    let first = true;
    for item in items {
        if !first { out += sep; }
        out += item.to_string();
        first = false;
    }
    out
}

private fn _cell(value) {
    if type_of(value) == "()" { return ""; }
    let s = value.to_string();
    if s.contains(",") || s.contains("\"") || s.contains("\n") {
        s.replace("\"", "\"\"");
        return "\"" + s + "\"";
    }
    s
}

private fn _csv_name(filename) {
    let name = filename.to_string();
    name.trim();
    if name.is_empty() { name = "spreadsheet"; }
    if !name.ends_with(".csv") { name += ".csv"; }
    name
}

private fn _columns_of(rows, columns) {
    let cols = columns;
    for row in rows {
        if type_of(row) != "map" { continue; }
        for key in row.keys() {
            if !cols.contains(key) { cols.push(key); }
        }
    }
    cols
}

private fn _render(columns, rows) {
    let lines = [_join(columns, ",")];
    for row in rows {
        let cells = [];
        for col in columns {
            let cell = if type_of(row) == "map" { _cell(row[col]) } else { "" };
            cells.push(cell);
        }
        lines.push(_join(cells, ","));
    }
    _join(lines, "\n") + "\n"
}

fn create_spreadsheet(data, filename) {
    if type_of(data) != "array" {
        return #{ success: false, error: "data must be an array of maps", message: "Failed to create spreadsheet" };
    }
    let path = _csv_name(filename);
    let columns = _columns_of(data, []);
    let failure = ();
    try {
        write_text(path, _render(columns, data));
    } catch (err) {
        failure = `${err}`;
    }
    if type_of(failure) != "()" {
        return #{ success: false, error: failure, message: `Failed to create spreadsheet: ${failure}` };
    }
    this.rows = data;
    this.columns = columns;
    this.current_file = path;
    this.loaded = true;
    #{
        success: true,
        filepath: path,
        rows: data.len(),
        columns: columns.len(),
        message: `Spreadsheet created at ${path}`
    }
}

fn add_data(new_rows) {
    if !this.loaded {
        return #{ success: false, error: "No spreadsheet loaded", message: "Create or load a spreadsheet first" };
    }
    if type_of(new_rows) != "array" {
        return #{ success: false, error: "rows must be an array of maps", message: "No rows added" };
    }
    for row in new_rows { this.rows.push(row); }
    this.columns = _columns_of(new_rows, this.columns);
    #{
        success: true,
        rows_added: new_rows.len(),
        total_rows: this.rows.len(),
        message: `Added ${new_rows.len()} rows`
    }
}

fn save_spreadsheet(filename) {
    if !this.loaded {
        return #{ success: false, error: "No data to save", message: "Nothing to save" };
    }
    let path = if filename.to_string().is_empty() { this.current_file } else { _csv_name(filename) };
    let failure = ();
    try {
        write_text(path, _render(this.columns, this.rows));
    } catch (err) {
        failure = `${err}`;
    }
    if type_of(failure) != "()" {
        return #{ success: false, error: failure, message: `Failed to save spreadsheet: ${failure}` };
    }
    this.current_file = path;
    #{ success: true, filepath: path, message: `Spreadsheet saved to ${path}` }
}

fn load_spreadsheet(filename) {
    let path = _csv_name(filename);
    let text = "";
    let failure = ();
    try {
        text = read_text(path);
    } catch (err) {
        failure = `${err}`;
    }
    if type_of(failure) != "()" {
        return #{ success: false, error: failure, message: `Failed to load spreadsheet: ${failure}` };
    }
    let lines = text.split("\n");
    let header = lines.shift();
    let columns = if type_of(header) == "()" { [] } else { header.split(",") };
    let rows = [];
    for line in lines {
        if line.is_empty() { continue; }
        let cells = line.split(",");
        let row = #{};
        for i in 0..columns.len() {
            row[columns[i]] = if i < cells.len() { cells[i] } else { "" };
        }
        rows.push(row);
    }
    this.rows = rows;
    this.columns = columns;
    this.current_file = path;
    this.loaded = true;
    #{ success: true, filepath: path, rows: rows.len(), message: `Loaded ${rows.len()} rows from ${path}` }
}
"#;

/// Directory and file helpers restricted to relative workspace paths.
pub const FILE_MANAGER: &str = r#"
// File manager capability: workspace-relative file and directory operations.

fn create() {
    #{ operations: 0 }
}

fn is_safe_path(path) {
    let p = path.to_string();
    !(p.is_empty() || p.starts_with("/") || p.starts_with("~") || p.contains("..") || p.contains(":"))
}

fn create_directory(path) {
    if !is_safe_path(path) {
        return #{ success: false, error: "Path not in workspace", message: `Refused to create ${path}` };
    }
    let failure = ();
    try {
        make_dir(path);
    } catch (err) {
        failure = `${err}`;
    }
    if type_of(failure) != "()" {
        return #{ success: false, error: failure, message: `Failed to create ${path}` };
    }
    this.operations += 1;
    #{ success: true, path: path, message: `Directory created: ${path}` }
}

fn list_files(directory) {
    if !is_safe_path(directory) {
        return #{ success: false, error: "Path not in workspace", message: `Refused to list ${directory}` };
    }
    let names = [];
    let failure = ();
    try {
        names = list_dir(directory);
    } catch (err) {
        failure = `${err}`;
    }
    if type_of(failure) != "()" {
        return #{ success: false, error: failure, message: `Failed to list ${directory}` };
    }
    let files = [];
    for name in names {
        files.push(#{ name: name });
    }
    this.operations += 1;
    #{ success: true, directory: directory, files: files, count: files.len() }
}

fn copy_file_to(source, destination) {
    if !is_safe_path(source) || !is_safe_path(destination) {
        return #{ success: false, error: "Paths not in workspace", message: "Refused to copy" };
    }
    let failure = ();
    try {
        copy_file(source, destination);
    } catch (err) {
        failure = `${err}`;
    }
    if type_of(failure) != "()" {
        return #{ success: false, error: failure, message: `Failed to copy ${source}` };
    }
    this.operations += 1;
    #{
        success: true,
        source: source,
        destination: destination,
        message: `File copied from ${source} to ${destination}`
    }
}
"#;

/// CSV loading, summary statistics and row filtering.
pub const DATA_PROCESSOR: &str = r#"
// Data processor capability: load CSV rows, summarise and filter them.

fn create() {
    #{ rows: [], columns: [], loaded: false }
}

private fn _number(text) {
    let t = text.to_string();
    t.trim();
    let value = ();
    try {
        value = parse_float(t);
    } catch (err) {
        value = ();
    }
    value
}

private fn _matches(value, condition) {
    if type_of(condition) == "map" {
        let n = _number(value);
        let missing = type_of(n) == "()";
        if condition.contains("min") && (missing || n < _number(condition.min)) { return false; }
        if condition.contains("max") && (missing || n > _number(condition.max)) { return false; }
        if condition.contains("equals") && value.to_string() != condition.equals.to_string() { return false; }
        return true;
    }
    value.to_string() == condition.to_string()
}

fn load_csv(filepath) {
    let text = "";
    let failure = ();
    try {
        text = read_text(filepath);
    } catch (err) {
        failure = `${err}`;
    }
    if type_of(failure) != "()" {
        return #{ success: false, error: failure, message: `Failed to load ${filepath}` };
    }
    let lines = text.split("\n");
    let header = lines.shift();
    let columns = if type_of(header) == "()" { [] } else { header.split(",") };
    let rows = [];
    for line in lines {
        if line.is_empty() { continue; }
        let cells = line.split(",");
        let row = #{};
        for i in 0..columns.len() {
            row[columns[i]] = if i < cells.len() { cells[i] } else { "" };
        }
        rows.push(row);
    }
    this.rows = rows;
    this.columns = columns;
    this.loaded = true;
    #{ success: true, rows: rows.len(), columns: columns, message: `Loaded ${rows.len()} rows from ${filepath}` }
}

fn analyze_data() {
    if !this.loaded {
        return #{ success: false, error: "No data loaded", message: "Load data before analysing" };
    }
    let numeric = #{};
    for col in this.columns {
        let count = 0;
        let sum = 0.0;
        let lo = ();
        let hi = ();
        for row in this.rows {
            let n = _number(row[col]);
            if type_of(n) == "()" { continue; }
            count += 1;
            sum += n;
            if type_of(lo) == "()" || n < lo { lo = n; }
            if type_of(hi) == "()" || n > hi { hi = n; }
        }
        if count > 0 {
            numeric[col] = #{ count: count, min: lo, max: hi, mean: sum / count.to_float() };
        }
    }
    #{
        success: true,
        analysis: #{ rows: this.rows.len(), columns: this.columns, numeric_summary: numeric },
        message: "Data analysis completed"
    }
}

fn filter_data(conditions) {
    if !this.loaded {
        return #{ success: false, error: "No data loaded", message: "Load data before filtering" };
    }
    if type_of(conditions) != "map" {
        return #{ success: false, error: "conditions must be a map", message: "No filter applied" };
    }
    let kept = [];
    for row in this.rows {
        let keep = true;
        for column in conditions.keys() {
            if !this.columns.contains(column) { continue; }
            if !_matches(row[column], conditions[column]) { keep = false; break; }
        }
        if keep { kept.push(row); }
    }
    #{
        success: true,
        filtered_rows: kept.len(),
        original_rows: this.rows.len(),
        filtered_data: kept,
        message: `Filtered to ${kept.len()} rows`
    }
}
"#;
