//! Plain-text bills and statistics.
//!
//! Every function here is pure: callers pass in the records, titles and the
//! current time, and get back the exact text that is sent or written to disk.

use chrono::NaiveDateTime;

use crate::{
    formatting::{money, money_short, plain_number, whole},
    ledger::{
        group_sums, Book, DayRecords, DepositRecord, Timed, WithdrawalRecord, DATE_FORMAT,
        TIME_FORMAT,
    },
};

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━";
const LATEST_DEPOSIT_LINES: usize = 6;

/// The bill shown after every mutation.
pub fn main_bill(title: &str, book: &Book<'_>) -> String {
    let mut out = format!("====== {title} ======\n\n");
    push_bill_body(&mut out, book);
    out
}

fn push_bill_body(out: &mut String, book: &Book<'_>) {
    let rate = plain_number(book.fixed_rate);

    out.push_str(&format!("入款（{}笔）：\n", book.deposit_count()));
    let latest = book.latest_deposits(LATEST_DEPOSIT_LINES);
    if latest.is_empty() {
        out.push_str("  暂无入金\n");
    }
    for d in latest {
        out.push_str(&format!(
            "  {} {}/{} ={} {}\n",
            d.hour_minute(),
            whole(d.amount),
            rate,
            money(book.usd_of(d.amount)),
            d.responder.as_deref().unwrap_or(""),
        ));
    }

    let responders = book.per_responder();
    out.push_str(&format!("\n分类（{}人）：\n", responders.len()));
    if responders.is_empty() {
        out.push_str("  暂无分类\n");
    }
    for (name, total) in &responders {
        out.push_str(&format!("  {name} {}\n", money(*total)));
    }

    out.push_str(&format!("\n下发（{}笔）：\n", book.withdrawal_count()));
    let payouts = book.per_user_withdrawals_usdt();
    if payouts.is_empty() {
        out.push_str("  暂无下发\n");
    }
    for (user, usdt) in &payouts {
        out.push_str(&format!("  {user}: {}\n", money(*usdt)));
    }

    out.push('\n');
    push_totals_block(out, book);
}

fn push_totals_block(out: &mut String, book: &Book<'_>) {
    let d = book.deposit_total();
    out.push_str(&format!("费率：{}%\n", plain_number(book.fee_rate)));
    out.push_str(&format!("固定汇率：{}\n", plain_number(book.fixed_rate)));
    out.push_str(&format!("总入款：{}\n", money(d)));
    out.push_str(&format!(
        "应下发：{}｜{}U\n",
        money(d),
        money(book.to_be_withdrawn())
    ));
    out.push_str(&format!(
        "已下发：{}｜{}U\n",
        money(book.withdrawal_local()),
        money(book.withdrawal_usdt())
    ));
    out.push_str(&format!(
        "未下发：{}｜{}U\n",
        money(book.pending_local()),
        money(book.not_yet_withdrawn())
    ));
}

/// `财务统计`: today's activity plus running totals of the active ledger.
pub fn financial_summary(title: &str, today: &str, all: &Book<'_>, today_book: &Book<'_>) -> String {
    let mut out = format!("====== {title} 财务账单 ======\n\n");

    out.push_str(&format!("===== 今日 ({today}) =====\n"));
    out.push_str(&format!(
        "入款: {}笔，共计 {}\n",
        today_book.deposit_count(),
        money(today_book.deposit_total())
    ));
    for (user, amount) in today_book.per_user_deposits() {
        out.push_str(&format!("  {user}: {}\n", money(amount)));
    }
    out.push_str(&format!(
        "出款: {}笔，共计 {}\n",
        today_book.withdrawal_count(),
        money(today_book.withdrawal_local())
    ));
    for (user, amount) in today_book.per_user_withdrawals_local() {
        out.push_str(&format!("  {user}: {}\n", money(amount)));
    }

    let to_be = all.to_be_withdrawn();
    let paid = all.withdrawal_local();
    out.push_str("\n===== 总计 =====\n");
    out.push_str(&format!(
        "总入款: {}笔，共计 {}\n",
        all.deposit_count(),
        money(all.deposit_total())
    ));
    out.push_str(&format!(
        "总出款: {}笔，共计 {}\n",
        all.withdrawal_count(),
        money(paid)
    ));
    out.push_str(&format!("费率: {}%\n", plain_number(all.fee_rate)));
    out.push_str(&format!("固定汇率: {}\n", plain_number(all.fixed_rate)));
    out.push_str(&format!("应下发: {}\n", money(to_be)));
    out.push_str(&format!("已下发: {}\n", money(paid)));
    out.push_str(&format!("未下发: {}\n", money(to_be - paid)));
    out
}

/// Numbered detail lines, newest first. Deposits are converted at the book's rate.
fn push_deposit_details(out: &mut String, book: &Book<'_>) {
    let deposits = book.deposits_newest_first();
    if deposits.is_empty() {
        out.push_str("暂无入款记录\n");
    }
    for (i, d) in deposits.iter().enumerate() {
        out.push_str(&format!(
            "{}. 时间: {}, 金额: {}, 用户: {}, USD等值: {}\n",
            i + 1,
            d.time,
            money(d.amount),
            d.user,
            money(book.usd_of(d.amount))
        ));
    }
}

fn push_withdrawal_details(out: &mut String, book: &Book<'_>) {
    let withdrawals = book.withdrawals_newest_first();
    if withdrawals.is_empty() {
        out.push_str("暂无出款记录\n");
    }
    for (i, w) in withdrawals.iter().enumerate() {
        out.push_str(&format!(
            "{}. 时间: {}, 金额: {}, 用户: {}, USD等值: {}\n",
            i + 1,
            w.time,
            money(w.amount),
            w.user,
            money(w.usd_equivalent)
        ));
    }
}

/// Content of the `详细账单` export.
pub fn detailed_bill(title: &str, book: &Book<'_>, generated_at: NaiveDateTime) -> String {
    let mut out = format!("====== {title} 账单明细 ======\n\n");
    out.push_str(&format!(
        "生成时间: {} {}\n\n",
        generated_at.format(DATE_FORMAT),
        generated_at.format("%H:%M:%S")
    ));

    out.push_str(&format!("费率: {}%\n", plain_number(book.fee_rate)));
    out.push_str(&format!("固定汇率: {}\n", plain_number(book.fixed_rate)));
    out.push_str(&format!("总入款: {}\n", money(book.deposit_total())));
    out.push_str(&format!("应下发: {}U\n", money(book.to_be_withdrawn())));
    out.push_str(&format!("已下发: {}U\n", money(book.withdrawal_usdt())));
    out.push_str(&format!("未下发: {}U\n\n", money(book.not_yet_withdrawn())));

    out.push_str("===== 入款明细 =====\n");
    push_deposit_details(&mut out, book);
    out.push_str("\n===== 出款明细 =====\n");
    push_withdrawal_details(&mut out, book);
    out
}

/// Per-user view of one day, used as the preview of a per-date export.
pub fn date_summary(title: &str, day: &DayRecords) -> String {
    let book = day.book();
    let mut out = format!("====== {title} {} 财务账单 ======\n\n", day.date);

    out.push_str(&format!("入款（{}笔）：\n", book.deposit_count()));
    let deposits = book.per_user_deposits();
    if deposits.is_empty() {
        out.push_str("  暂无入金\n");
    }
    for (user, amount) in &deposits {
        out.push_str(&format!("  {user}: {}\n", money(*amount)));
    }

    out.push_str(&format!("\n下发（{}笔）：\n", book.withdrawal_count()));
    let payouts = book.per_user_withdrawals_usdt();
    if payouts.is_empty() {
        out.push_str("  暂无下发\n");
    }
    for (user, usdt) in &payouts {
        out.push_str(&format!("  {user}: {}\n", money(*usdt)));
    }

    out.push('\n');
    push_totals_block(&mut out, &book);
    out
}

/// Content of a per-date export file.
pub fn date_export(title: &str, day: &DayRecords, exported_at: NaiveDateTime) -> String {
    let book = day.book();
    let mut out = format!("===== {title} {} 财务账单 =====\n", day.date);
    out.push_str(&format!("导出时间: {}\n\n", exported_at.format(TIME_FORMAT)));
    out.push_str(&main_bill(title, &book));
    out.push('\n');

    out.push_str("===== 入款明细 =====\n");
    if day.deposits.is_empty() {
        out.push_str("暂无入款记录\n");
    }
    for (i, d) in day.deposits.iter().enumerate() {
        out.push_str(&format!(
            "{}. 时间: {}, 金额: {}, 用户: {}",
            i + 1,
            d.time,
            money(d.amount),
            d.user
        ));
        if let Some(responder) = d.responder.as_deref().filter(|r| !r.is_empty()) {
            out.push_str(&format!(", 回复人: {responder}"));
        }
        out.push_str(&format!(", USD等值: {}\n", money(d.usd_equivalent)));
    }

    out.push_str("\n===== 出款明细 =====\n");
    if day.withdrawals.is_empty() {
        out.push_str("暂无出款记录\n");
    }
    for (i, w) in day.withdrawals.iter().enumerate() {
        out.push_str(&format!(
            "{}. 时间: {}, 金额: {}, 用户: {}, USD等值: {}\n",
            i + 1,
            w.time,
            money(w.amount),
            w.user,
            money(w.usd_equivalent)
        ));
    }
    out
}

/// Records of several days flattened into one book-like set.
struct Span {
    deposits: Vec<DepositRecord>,
    withdrawals: Vec<WithdrawalRecord>,
}

impl Span {
    fn collect(days: &[DayRecords]) -> Self {
        Self {
            deposits: days.iter().flat_map(|d| d.deposits.iter().cloned()).collect(),
            withdrawals: days
                .iter()
                .flat_map(|d| d.withdrawals.iter().cloned())
                .collect(),
        }
    }

    fn book(&self, fee_rate: f64, fixed_rate: f64) -> Book<'_> {
        Book::new(&self.deposits, &self.withdrawals, fee_rate, fixed_rate)
    }
}

/// Summary of the last seven days. `days` holds one entry per date, newest first.
pub fn seven_day_summary(title: &str, days: &[DayRecords], fee_rate: f64, fixed_rate: f64) -> String {
    let span = Span::collect(days);
    let book = span.book(fee_rate, fixed_rate);
    let to_be = book.to_be_withdrawn();
    let paid = book.withdrawal_local();

    let mut out = format!("====== {title} 最近7天账单 ======\n\n");
    out.push_str("总计统计：\n");
    out.push_str(&format!(
        "总入款：{}笔，共计 {}\n",
        book.deposit_count(),
        money(book.deposit_total())
    ));
    out.push_str(&format!("总下发：{}笔，共计 {}\n", book.withdrawal_count(), money(paid)));
    out.push_str(&format!("费率：{}%\n", plain_number(fee_rate)));
    out.push_str(&format!("固定汇率：{}\n", plain_number(fixed_rate)));
    out.push_str(&format!("应下发：{}\n", money(to_be)));
    out.push_str(&format!("已下发：{}\n", money(paid)));
    out.push_str(&format!("未下发：{}\n\n", money(to_be - paid)));

    out.push_str("按日期统计：\n");
    for day in days.iter().filter(|d| !d.is_empty()) {
        let b = day.book();
        out.push_str(&format!("\n----- {} -----\n", day.date));
        out.push_str(&format!(
            "入款：{}笔，共计 {}\n",
            b.deposit_count(),
            money(b.deposit_total())
        ));
        for (user, amount) in b.per_user_deposits() {
            out.push_str(&format!("  {user}: {}\n", money(amount)));
        }
        out.push_str(&format!(
            "下发：{}笔，共计 {}\n",
            b.withdrawal_count(),
            money(b.withdrawal_local())
        ));
        for (user, amount) in b.per_user_withdrawals_local() {
            out.push_str(&format!("  {user}: {}\n", money(amount)));
        }
    }

    out.push_str("\n注：导出的文件中将包含每笔交易的详细记录。\n");
    out
}

/// Content of the 7-day export file: the summary plus every record.
pub fn seven_day_export(
    title: &str,
    days: &[DayRecords],
    fee_rate: f64,
    fixed_rate: f64,
    exported_at: NaiveDateTime,
) -> String {
    let span = Span::collect(days);
    let book = span.book(fee_rate, fixed_rate);

    let mut out = format!("===== {title} 财务账单 =====\n");
    out.push_str(&format!("导出时间: {}\n\n", exported_at.format(TIME_FORMAT)));
    out.push_str(&seven_day_summary(title, days, fee_rate, fixed_rate));
    out.push('\n');

    out.push_str("===== 全部入款明细 =====\n");
    push_deposit_details(&mut out, &book);
    out.push_str("\n===== 全部出款明细 =====\n");
    push_withdrawal_details(&mut out, &book);

    out.push_str("\n===== 按日期明细 =====\n");
    for day in days.iter().filter(|d| !d.is_empty()) {
        let b = Book::new(&day.deposits, &day.withdrawals, fee_rate, fixed_rate);
        out.push_str(&format!("\n----- {} -----\n", day.date));

        out.push_str("入款:\n");
        let deposits = b.deposits_newest_first();
        if deposits.is_empty() {
            out.push_str("  暂无入款记录\n");
        }
        for (i, d) in deposits.iter().enumerate() {
            out.push_str(&format!(
                "  {}. {}, {}, {}, USD等值: {}\n",
                i + 1,
                d.clock().unwrap_or("未知时间"),
                d.user,
                money(d.amount),
                money(b.usd_of(d.amount))
            ));
        }

        out.push_str("出款:\n");
        let withdrawals = b.withdrawals_newest_first();
        if withdrawals.is_empty() {
            out.push_str("  暂无出款记录\n");
        }
        for (i, w) in withdrawals.iter().enumerate() {
            out.push_str(&format!(
                "  {}. {}, {}, {}, USD等值: {}\n",
                i + 1,
                w.clock().unwrap_or("未知时间"),
                w.user,
                money(w.amount),
                money(w.usd_equivalent)
            ));
        }
    }
    out
}

/// One chat's records for the cross-chat statistics.
#[derive(Clone, Debug)]
pub struct ChatDay {
    pub title: String,
    pub day: DayRecords,
}

fn sort_descending(totals: &mut [(String, f64)]) {
    totals.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
}

/// Statistics of every chat with records on `date`.
pub fn all_chats_statistics(date: &str, chats: &[ChatDay], exported_at: NaiveDateTime) -> String {
    let mut out = format!("📊 {date} 所有群组财务统计 📊\n");
    out.push_str(&format!("导出时间: {}\n\n", exported_at.format(TIME_FORMAT)));

    let mut deposit_count = 0;
    let mut deposit_total = 0.0;
    let mut withdrawal_count = 0;
    let mut withdrawal_local = 0.0;
    let mut to_be_total = 0.0;
    let mut not_yet_total = 0.0;

    for chat in chats {
        let book = chat.day.book();
        deposit_count += book.deposit_count();
        deposit_total += book.deposit_total();
        withdrawal_count += book.withdrawal_count();
        withdrawal_local += book.withdrawal_local();
        to_be_total += book.to_be_withdrawn();
        not_yet_total += book.not_yet_withdrawn();

        let d = book.deposit_total();
        out.push_str(&format!("[{}]\n", chat.title));
        out.push_str(&format!("费率：{}%\n", plain_number(book.fee_rate)));
        out.push_str(&format!("固定汇率：{}\n", plain_number(book.fixed_rate)));
        out.push_str(&format!("总入款：{}\n", money_short(d)));
        out.push_str(&format!(
            "应下发：{}｜{}U\n",
            money_short(d),
            money(book.to_be_withdrawn())
        ));
        out.push_str(&format!(
            "已下发：{}｜{}U\n",
            money_short(book.withdrawal_local()),
            money(book.withdrawal_usdt())
        ));
        out.push_str(&format!(
            "未下发：{}｜{}U\n\n",
            money_short(book.pending_local()),
            money(book.not_yet_withdrawn())
        ));
    }

    out.push_str("\n📊 所有群组总计统计 📊\n\n");

    // (operator, chat title) pairs in first-seen order.
    let pairs: Vec<(&str, &str, f64)> = chats
        .iter()
        .flat_map(|c| {
            c.day
                .deposits
                .iter()
                .map(move |d| (d.user.as_str(), c.title.as_str(), d.amount))
        })
        .collect();
    let mut operators = group_sums(&pairs, |p| Some(p.0), |p| p.2);
    sort_descending(&mut operators);

    out.push_str("👨‍💼 操作人总统计\n");
    out.push_str(RULE);
    out.push('\n');
    if operators.is_empty() {
        out.push_str("暂无操作记录\n");
    }
    for (operator, total) in &operators {
        out.push_str(&format!("• {operator}: {}\n", money(*total)));
        let per_chat = group_sums(
            pairs.iter().filter(|p| p.0 == operator.as_str()),
            |p| Some(p.1),
            |p| p.2,
        );
        let listed: Vec<String> = per_chat
            .iter()
            .map(|(title, amount)| format!("{title}: {}", money(*amount)))
            .collect();
        out.push_str(&format!("  📋 群组: {}\n", listed.join(", ")));
    }

    let mut responders = group_sums(
        chats.iter().flat_map(|c| c.day.deposits.iter()),
        |d| Some(d.responder.as_deref().unwrap_or("None")),
        |d| d.amount,
    );
    sort_descending(&mut responders);

    out.push_str("\n👤 回复人总统计\n");
    out.push_str(RULE);
    out.push('\n');
    if responders.is_empty() {
        out.push_str("暂无回复记录\n");
    }
    for (responder, total) in &responders {
        out.push_str(&format!("• {responder} {}\n", money(*total)));
    }

    out.push_str("\n📈 总计统计\n");
    out.push_str(RULE);
    out.push('\n');
    out.push_str(&format!("• 群组数量: {}\n", chats.len()));
    out.push_str(&format!("• 总入款: {deposit_count}笔，{}\n", money(deposit_total)));
    out.push_str(&format!(
        "• 总出款: {withdrawal_count}笔，{}\n",
        money(withdrawal_local)
    ));
    out.push_str(&format!("• 总应下发: {}\n", money(to_be_total)));
    out.push_str(&format!("• 总未下发: {}\n", money(not_yet_total)));
    out
}

pub fn brief_help(is_manager: bool) -> String {
    let mut out = String::from("📱 账务机器人使用指南\n\n");
    out.push_str("查看完整帮助，请私聊机器人发送 /help\n");
    out.push_str("💰 可用的基本功能: 计算器，导出账单\n");
    if is_manager {
        out.push_str("⚙️ 管理员可用: 入款、出款、财务统计等功能\n");
    }
    out.push_str("\n💬 使用示例: 计算 1+2, 导出昨日账单, 导出全部账单");
    out
}

pub fn full_help(is_manager: bool, is_admin: bool) -> String {
    let mut out = String::from("🤖 账务机器人使用指南 🤖\n\n");

    out.push_str("📊 普通用户可用命令: \n");
    out.push_str("🧮 1+2*3 - 直接输入数学表达式进行计算\n");
    out.push_str("🧮 计算 1+2*3 - 使用计算命令计算表达式\n");
    out.push_str("📋 导出昨日账单 - 导出昨天的账单记录\n");
    out.push_str("📋 导出全部账单 - 导出最近7天的账单记录\n");

    if is_manager {
        out.push_str("\n🔑 管理员/操作员命令: \n");
        out.push_str("➕ +100 - 记录入款100元\n");
        out.push_str("➕ +100/7.2 - 设置汇率7.2并记录入款100元\n");
        out.push_str("➖ -100 - 记录减款100元\n");
        out.push_str("➖ -100/7.2 - 设置汇率7.2并记录减款100元\n");
        out.push_str("💸 回100 - 记录回款100U并显示账单\n");
        out.push_str("💸 下发100 - 记录下发100U并显示账单\n");
        out.push_str("📊 财务 或 财务账单 - 显示当前财务状况\n");
        out.push_str("📊 财务统计 - 显示财务账单统计信息\n");
        out.push_str("📊 财务查账 - 选择日期查看财务账单\n");
        out.push_str("⚙️ 设置费率5% - 设置费率为5%\n");
        out.push_str("⚙️ 设置汇率7.2 - 设置美元汇率为7.2\n");
    }

    if is_admin {
        out.push_str("\n🔐 管理员专属命令: \n");
        out.push_str("👥 授权群 - 授权当前群组使用机器人\n");
        out.push_str("👤 设置操作人 @xxx - 添加群管理\n");
        out.push_str("👤 回复某人消息并发送 设置操作人 - 设置被回复的用户为操作人\n");
        out.push_str("👤 删除操作人 @xxx - 删除群管理\n");
        out.push_str("👥 显示操作人 - 显示当前操作人列表\n");
        out.push_str("🔄 重置授权人 - 重置操作人为初始状态\n");
        out.push_str("🧹 清空操作人 - 清空所有操作人\n");
        out.push_str("🔄 /reset - 重置当前群组的账单\n");
    }
    out
}
